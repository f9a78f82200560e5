//! Sampling temperature.
//!
//! Temperature travels with each request instead of living in a
//! process-wide cell, so concurrent runs can sample differently.

use serde::{Deserialize, Serialize};

/// Sampling temperature clamped to `[0.0, 1.5]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 1.5;
    pub const DEFAULT: Temperature = Temperature(0.7);

    /// Clamp `value` into range. NaN falls back to the default.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::DEFAULT;
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<f32> for Temperature {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> Self {
        t.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
