//! Care Router: customer-support message routing over an LLM.

pub mod config;
pub mod error;
pub mod eval;
pub mod llm;
pub mod pipeline;
pub mod store;
