//! Session runtime configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::game::TimeControl;

/// Limits and defaults applied to every session controller.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Maximum wait for an automated opponent's move
    #[serde(default = "default_bot_move_timeout")]
    pub bot_move_timeout_ms: u64,

    /// Capacity of each controller's event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of each controller's change-update broadcast
    #[serde(default = "default_update_capacity")]
    pub update_capacity: usize,

    /// Initial clock budget offered in challenges
    #[serde(default = "default_initial_secs")]
    pub default_initial_secs: u64,

    /// Per-move increment offered in challenges
    #[serde(default)]
    pub default_increment_secs: u64,
}

impl SessionConfig {
    pub fn bot_move_timeout(&self) -> Duration {
        Duration::from_millis(self.bot_move_timeout_ms)
    }

    /// Time control offered when a challenge does not name one.
    pub fn default_time_control(&self) -> Result<TimeControl, ValidationError> {
        TimeControl::new(self.default_initial_secs, self.default_increment_secs)
            .map_err(|_| ValidationError::InvalidTimeControl)
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bot_move_timeout_ms == 0 || self.bot_move_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidBotTimeout);
        }
        if self.event_queue_capacity == 0 || self.update_capacity == 0 {
            return Err(ValidationError::InvalidCapacity);
        }
        self.default_time_control()?;
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bot_move_timeout_ms: default_bot_move_timeout(),
            event_queue_capacity: default_event_queue_capacity(),
            update_capacity: default_update_capacity(),
            default_initial_secs: default_initial_secs(),
            default_increment_secs: 0,
        }
    }
}

fn default_bot_move_timeout() -> u64 {
    5_000
}

fn default_event_queue_capacity() -> usize {
    64
}

fn default_update_capacity() -> usize {
    128
}

fn default_initial_secs() -> u64 {
    600
}
