//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, lifecycle status and error types
//! that form the vocabulary of the session synchronizer.

mod errors;
mod game_status;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use game_status::GameStatus;
pub use ids::{GameRecordId, ParticipantId, SessionId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
