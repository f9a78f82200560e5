//! Persistence layer — review dataset, example store, telemetry sink.

mod libsql_backend;
pub mod migrations;
pub mod records;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use records::{ModelOutput, PipelineEvent, ReviewCount, ReviewRecord};
pub use traits::{
    ExampleStore, FewShotExample, NoExamples, NoopTelemetry, StaticExamples, TelemetrySink,
};
