//! In-process real-time channel.
//!
//! Used when both participants live in the same process (tests, bot games
//! hosted next to the human's session) and as the fan-out core of the
//! WebSocket relay.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::rooms::RoomManager;
use crate::domain::foundation::ParticipantId;
use crate::domain::protocol::{encode, SyncMessage};
use crate::ports::{ChannelError, RealtimeChannel};

/// [`RealtimeChannel`] over a shared [`RoomManager`].
#[derive(Clone)]
pub struct InMemoryChannel {
    rooms: Arc<RoomManager>,
}

impl InMemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self::with_rooms(Arc::new(RoomManager::new(capacity)))
    }

    /// Share an existing room manager, e.g. the relay server's.
    pub fn with_rooms(rooms: Arc<RoomManager>) -> Self {
        Self { rooms }
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::with_rooms(Arc::new(RoomManager::with_default_capacity()))
    }
}

#[async_trait]
impl RealtimeChannel for InMemoryChannel {
    async fn emit(&self, group: &ParticipantId, message: &SyncMessage) -> Result<(), ChannelError> {
        let frame = encode(message)?;
        let reached = self.rooms.broadcast(group, frame).await;
        if reached == 0 {
            tracing::debug!(
                participant_id = %group,
                kind = message.kind(),
                "No live connection for group, frame dropped"
            );
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        group: &ParticipantId,
    ) -> Result<broadcast::Receiver<String>, ChannelError> {
        Ok(self.rooms.subscribe(group).await)
    }
}
