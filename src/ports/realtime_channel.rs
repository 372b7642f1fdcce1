//! RealtimeChannel port - Per-participant broadcast groups.
//!
//! Every participant identity names one broadcast group. Anything emitted
//! to a group reaches all of that participant's live subscriptions. Frames
//! travel encoded; subscribers decode them centrally.
//!
//! Reconnection is the adapter's concern. The protocol's idempotency keys
//! absorb any redelivery it causes.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::foundation::ParticipantId;
use crate::domain::protocol::{ProtocolError, SyncMessage};

/// Errors from the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The underlying connection is gone.
    #[error("channel disconnected: {0}")]
    Disconnected(String),
}

/// Port for emitting to and subscribing on broadcast groups.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Send `message` to every connection in `group`.
    ///
    /// Delivery is fire-and-forget: a group with no live connection drops
    /// the frame.
    async fn emit(&self, group: &ParticipantId, message: &SyncMessage) -> Result<(), ChannelError>;

    /// Join `group`, receiving raw frames addressed to it.
    async fn subscribe(
        &self,
        group: &ParticipantId,
    ) -> Result<broadcast::Receiver<String>, ChannelError>;
}
