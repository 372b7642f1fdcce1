//! How a session ended.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::chess::{Color, Termination};
use crate::domain::foundation::ParticipantId;

/// Why a completed game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Checkmate,
    Stalemate,
    Draw,
    Timeout,
    Resignation,
}

/// Result of a completed game. `winner == None` is a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub winner: Option<Color>,
    pub reason: ResultReason,
}

impl GameResult {
    /// Derive the result from a terminal classification.
    ///
    /// `to_move` is the side to move in the terminal position.
    pub fn from_termination(termination: Termination, to_move: Color) -> Self {
        match termination {
            Termination::Checkmate => Self {
                winner: Some(to_move.opposite()),
                reason: ResultReason::Checkmate,
            },
            Termination::Stalemate => Self {
                winner: None,
                reason: ResultReason::Stalemate,
            },
            Termination::Draw => Self {
                winner: None,
                reason: ResultReason::Draw,
            },
        }
    }

    /// `flagged` ran out of time.
    pub fn timeout(flagged: Color) -> Self {
        Self {
            winner: Some(flagged.opposite()),
            reason: ResultReason::Timeout,
        }
    }

    /// `resigning` gave up.
    pub fn resignation(resigning: Color) -> Self {
        Self {
            winner: Some(resigning.opposite()),
            reason: ResultReason::Resignation,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winner {
            Some(Color::White) => write!(f, "1-0 ({:?})", self.reason),
            Some(Color::Black) => write!(f, "0-1 ({:?})", self.reason),
            None => write!(f, "1/2-1/2 ({:?})", self.reason),
        }
    }
}

/// Why a session was forcibly torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// An administrator ended the session.
    Admin,
    /// A moderation ban against one participant.
    Banned { participant: ParticipantId },
    /// The participants' positions disagreed after the same move.
    Divergence,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Admin => write!(f, "terminated by administrator"),
            TerminationReason::Banned { participant } => {
                write!(f, "participant {} was banned", participant)
            }
            TerminationReason::Divergence => write!(f, "positions diverged"),
        }
    }
}

/// Final state of a session once it leaves `Active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionEnd {
    Completed { result: GameResult },
    Terminated { reason: TerminationReason },
}
