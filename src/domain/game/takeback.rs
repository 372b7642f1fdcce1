//! Takeback negotiation (tournament sessions only).

use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::domain::chess::Color;

/// Observable negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TakebackState {
    #[default]
    None,
    Requested,
    Accepted,
    Declined,
}

/// At most one outstanding request per session.
///
/// `Accepted` and `Declined` are reported as the outcome of answering a
/// request; the negotiation itself falls straight back to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TakebackNegotiation {
    requested_by: Option<Color>,
}

impl TakebackNegotiation {
    pub fn state(&self) -> TakebackState {
        if self.requested_by.is_some() {
            TakebackState::Requested
        } else {
            TakebackState::None
        }
    }

    pub fn requested_by(&self) -> Option<Color> {
        self.requested_by
    }

    /// Raise a request on behalf of `by`.
    pub fn request(&mut self, by: Color) -> Result<(), SessionError> {
        if self.requested_by.is_some() {
            return Err(SessionError::TakebackPending);
        }
        self.requested_by = Some(by);
        Ok(())
    }

    /// Answer the outstanding request. Only the other side may answer.
    pub fn answer(&mut self, responder: Color, accept: bool) -> Result<TakebackState, SessionError> {
        match self.requested_by {
            Some(requester) if requester != responder => {
                self.requested_by = None;
                Ok(if accept {
                    TakebackState::Accepted
                } else {
                    TakebackState::Declined
                })
            }
            _ => Err(SessionError::NoTakebackRequest),
        }
    }

    /// Drop any outstanding request. Returns true if one was cleared.
    pub fn clear(&mut self) -> bool {
        self.requested_by.take().is_some()
    }
}
