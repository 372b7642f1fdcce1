//! Errors surfaced to the local participant.

use thiserror::Error;

use crate::domain::chess::Color;
use super::GameResult;
use crate::domain::foundation::{GameStatus, ValidationError};
use crate::ports::RulesError;

/// Session-level errors.
///
/// Local callers receive these synchronously; the same conditions arriving
/// from the remote peer are logged and dropped instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is not accepting this action in its current status.
    #[error("session is {0}")]
    NotActive(GameStatus),

    /// The clock of the side to move ran out before the move arrived; the
    /// session has been completed with this result.
    #[error("time ran out: {0}")]
    TimeExpired(GameResult),

    /// The acting color is not the color to move.
    #[error("not {attempted}'s turn, {expected} to move")]
    NotYourTurn { expected: Color, attempted: Color },

    /// The rules engine rejected the move or the position.
    #[error(transparent)]
    Rules(#[from] RulesError),

    /// Takeback is only negotiated in tournament sessions.
    #[error("takeback is not available in this session")]
    TakebackNotAllowed,

    /// A takeback request is already outstanding.
    #[error("a takeback request is already outstanding")]
    TakebackPending,

    /// There is no request to answer, or the responder asked for it.
    #[error("no takeback request to answer")]
    NoTakebackRequest,

    /// The move log is empty.
    #[error("no move to take back")]
    NothingToTakeBack,

    /// A lifecycle transition was refused.
    #[error(transparent)]
    InvalidTransition(#[from] ValidationError),

    /// The controller driving the session has shut down.
    #[error("session has been closed")]
    Closed,
}
