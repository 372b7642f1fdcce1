//! Negotiated time control.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::foundation::ValidationError;

/// Starting budget per side plus per-move increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub initial_secs: u64,
    #[serde(default)]
    pub increment_secs: u64,
}

impl TimeControl {
    /// Creates a validated time control.
    pub fn new(initial_secs: u64, increment_secs: u64) -> Result<Self, ValidationError> {
        if initial_secs == 0 {
            return Err(ValidationError::invalid_format(
                "time_control",
                "initial time must be positive",
            ));
        }
        Ok(Self {
            initial_secs,
            increment_secs,
        })
    }

    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs)
    }

    pub fn increment(&self) -> Duration {
        Duration::from_secs(self.increment_secs)
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            initial_secs: 600,
            increment_secs: 0,
        }
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.initial_secs, self.increment_secs)
    }
}
