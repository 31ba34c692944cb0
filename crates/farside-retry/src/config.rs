//! # Retry Configuration
//!
//! The tagged, serializable description of a retry policy. Delays are given
//! in seconds.
//!
//! ```json
//! { "kind": "exponential", "max_attempts": 10, "base_delay": 5, "max_delay": 300 }
//! ```

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

fn default_max_attempts() -> u32 {
    10
}

fn default_delay() -> f64 {
    5.0
}

fn default_max_delay() -> f64 {
    300.0
}

/// Tagged retry configuration. The `kind` field selects the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryConfig {
    Fixed {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_delay")]
        delay: f64,
    },
    Exponential {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_delay")]
        base_delay: f64,
        #[serde(default = "default_max_delay")]
        max_delay: f64,
    },
}

impl RetryConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a configuration from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::Fixed {
            max_attempts: default_max_attempts(),
            delay: default_delay(),
        }
    }
}
