//! Broadcast groups keyed by participant identity.
//!
//! Every participant owns one group; each of the participant's live
//! connections holds a receiver on it. Frames addressed to a participant
//! fan out to all of them.
//!
//! ```text
//! Group: alice         Group: bob
//! ├── conn-a (tab 1)   └── conn-c
//! └── conn-b (tab 2)
//! ```
//!
//! Membership is append/remove-only; no operation touches another
//! member's data.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::foundation::ParticipantId;

/// Identifier for one live connection.
///
/// Generated when the connection joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of per-participant broadcast groups.
///
/// # Thread Safety
///
/// Uses `RwLock` for the group map since broadcasts (reads) vastly
/// outnumber joins/leaves (writes).
pub struct RoomManager {
    /// participant → broadcast sender for that participant's group.
    groups: RwLock<HashMap<ParticipantId, broadcast::Sender<String>>>,

    /// connection → participant, for cleanup on disconnect.
    connections: RwLock<HashMap<ConnectionId, ParticipantId>>,

    /// Buffer size of each group's broadcast channel.
    channel_capacity: usize,
}

impl RoomManager {
    /// Create a manager whose groups buffer `channel_capacity` frames.
    ///
    /// Receivers that fall further behind than that lose the oldest frames.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    /// Create with default capacity (128 frames).
    pub fn with_default_capacity() -> Self {
        Self::new(128)
    }

    /// Join a tracked connection to `participant`'s group, creating the
    /// group if needed.
    pub async fn join(
        &self,
        participant: &ParticipantId,
        connection: ConnectionId,
    ) -> broadcast::Receiver<String> {
        let receiver = self.subscribe(participant).await;
        self.connections
            .write()
            .await
            .insert(connection, participant.clone());
        receiver
    }

    /// Receiver on `participant`'s group without connection tracking.
    ///
    /// The group is pruned once every receiver has been dropped and a
    /// tracked connection leaves, or on [`RoomManager::prune`].
    pub async fn subscribe(&self, participant: &ParticipantId) -> broadcast::Receiver<String> {
        let mut groups = self.groups.write().await;
        let sender = groups.entry(participant.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.channel_capacity);
            tx
        });
        sender.subscribe()
    }

    /// Remove a connection, dropping its group if it is now empty.
    pub async fn leave(&self, connection: &ConnectionId) {
        let removed = self.connections.write().await.remove(connection);
        if let Some(participant) = removed {
            let mut groups = self.groups.write().await;
            let empty = groups
                .get(&participant)
                .map(|sender| sender.receiver_count() == 0)
                .unwrap_or(false);
            if empty {
                groups.remove(&participant);
            }
        }
    }

    /// Drop every group without receivers.
    pub async fn prune(&self) {
        self.groups
            .write()
            .await
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Send a frame to every connection in `participant`'s group.
    ///
    /// Returns how many receivers it reached; a missing or empty group
    /// is not an error.
    pub async fn broadcast(&self, participant: &ParticipantId, frame: String) -> usize {
        let groups = self.groups.read().await;
        groups
            .get(participant)
            .and_then(|sender| sender.send(frame).ok())
            .unwrap_or(0)
    }

    /// Live receivers in `participant`'s group.
    pub async fn connection_count(&self, participant: &ParticipantId) -> usize {
        self.groups
            .read()
            .await
            .get(participant)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Participants with an existing group.
    pub async fn active_groups(&self) -> Vec<ParticipantId> {
        self.groups.read().await.keys().cloned().collect()
    }

    /// Tracked connections across all groups.
    pub async fn total_connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
