//! GameStatus enum for tracking the lifecycle of a live session.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StateMachine;

/// Lifecycle status of a live game session.
///
/// Transitions are one-directional:
/// `Pending -> Active -> {Completed, Terminated}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Pending,
    Active,
    /// Finished by the rules of the game (mate, draw, timeout, resignation).
    Completed,
    /// Torn down by an interrupt (admin, ban, divergence).
    Terminated,
}

impl GameStatus {
    /// Returns true if moves may be applied.
    pub fn accepts_moves(&self) -> bool {
        matches!(self, GameStatus::Active)
    }
}

impl StateMachine for GameStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use GameStatus::*;
        match self {
            Pending => vec![Active, Terminated],
            Active => vec![Completed, Terminated],
            Completed | Terminated => vec![],
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Pending => "pending",
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
            GameStatus::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}
