//! Session change notifications.
//!
//! Published by the session controller to local observers (UI, logs)
//! after each state change. Observers that fall behind miss intermediate
//! updates but can always fetch a fresh snapshot.

use serde::{Deserialize, Serialize};

use super::clock::ClockState;
use super::outcome::SessionEnd;
use super::session::AppliedMove;
use crate::domain::chess::Color;
use crate::domain::foundation::{GameRecordId, SessionId};

// ════════════════════════════════════════════════════════════════════════════
// SessionUpdate
// ════════════════════════════════════════════════════════════════════════════

/// A change observed on one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Both participants are in; clocks are running.
    Started { session_id: SessionId },

    /// A move was applied, locally or from the remote participant.
    MoveApplied {
        session_id: SessionId,
        applied: AppliedMove,
        clock: ClockState,
    },

    /// A takeback was requested by `by`.
    TakebackRequested { session_id: SessionId, by: Color },

    /// The last move was taken back.
    TakebackAccepted {
        session_id: SessionId,
        removed: AppliedMove,
        clock: ClockState,
    },

    TakebackDeclined { session_id: SessionId },

    /// The external game record is now known.
    GameRecordAssigned {
        session_id: SessionId,
        game_record_id: GameRecordId,
    },

    /// The session left `Active` for good.
    Ended { session_id: SessionId, end: SessionEnd },
}

impl SessionUpdate {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionUpdate::Started { session_id }
            | SessionUpdate::MoveApplied { session_id, .. }
            | SessionUpdate::TakebackRequested { session_id, .. }
            | SessionUpdate::TakebackAccepted { session_id, .. }
            | SessionUpdate::TakebackDeclined { session_id }
            | SessionUpdate::GameRecordAssigned { session_id, .. }
            | SessionUpdate::Ended { session_id, .. } => *session_id,
        }
    }

    /// True for the final update a session ever publishes.
    pub fn is_final(&self) -> bool {
        matches!(self, SessionUpdate::Ended { .. })
    }
}
