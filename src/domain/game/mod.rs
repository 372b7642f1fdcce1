//! Game module - the live session aggregate and its value objects.
//!
//! - `MoveClock` - remaining time per side, derived from the last tick
//! - `GameSession` - move log, position, lifecycle and takeback state
//! - `SessionUpdate` - change notifications for local observers

mod clock;
mod errors;
mod events;
mod outcome;
mod session;
mod takeback;
mod time_control;

pub use clock::{ClockState, MoveClock};
pub use errors::SessionError;
pub use events::SessionUpdate;
pub use outcome::{GameResult, ResultReason, SessionEnd, TerminationReason};
pub use session::{AppliedMove, GameSession, SessionSetup, SessionSnapshot};
pub use takeback::{TakebackNegotiation, TakebackState};
pub use time_control::TimeControl;
