//! Relay-originated notices.
//!
//! The relay forwards `SyncMessage` frames untouched. These are the only
//! frames it produces itself; their `type` values sit outside the sync
//! vocabulary so participant hubs drop them as unknown kinds.

use serde::Serialize;

/// Frames sent by the relay to a connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RelayNotice {
    /// Connection joined its participant's group.
    #[serde(rename = "relay.connected")]
    Connected(ConnectedNotice),

    /// A frame from this connection was rejected.
    #[serde(rename = "relay.error")]
    Error(ErrorNotice),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNotice {
    pub participant_id: String,
    pub connection_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}
