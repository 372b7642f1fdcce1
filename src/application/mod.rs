//! Application layer - Session controllers and the participant hub.
//!
//! This layer drives the domain aggregates through the ports:
//!
//! - [`SessionController`] - single writer of one game session
//! - [`SessionManager`] - per-participant registry and message router
//! - [`AutomatedOpponent`] - bounded, cancellable engine requests
//! - [`MonotonicClock`] - timestamps consistent with runtime timers

mod automated_opponent;
mod session_controller;
mod session_manager;
mod time;

pub use automated_opponent::{
    fallback_move, AutomatedOpponent, BotMove, FallbackReason, MoveSource, OpponentError,
    PendingMove,
};
pub use session_controller::{SessionController, SessionDeps, SessionEvent, SessionHandle};
pub use session_manager::{HubError, SessionManager};
pub use time::MonotonicClock;
