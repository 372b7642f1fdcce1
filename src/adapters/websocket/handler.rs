//! WebSocket relay for participant broadcast groups.
//!
//! Connection lifecycle:
//! 1. Validate the participant id from the path
//! 2. Upgrade to WebSocket
//! 3. Join the participant's group
//! 4. Forward group frames out; route inbound envelopes to their recipient
//! 5. Leave the group on disconnect
//!
//! The relay does not interpret game state. It only checks that each
//! inbound envelope decodes through the central codec before fanning the
//! message out.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::adapters::channel::{ConnectionId, RoomManager};
use crate::domain::foundation::{ErrorCode, ParticipantId, Timestamp};
use crate::domain::protocol::{decode_envelope, encode};

use super::messages::{ConnectedNotice, ErrorNotice, RelayNotice};

/// State shared by relay handlers.
#[derive(Clone)]
pub struct RelayState {
    pub rooms: Arc<RoomManager>,
}

impl RelayState {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self { rooms }
    }
}

/// Upgrade handler.
///
/// Route: `GET /ws/:participant_id`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(participant_id): Path<String>,
    State(state): State<RelayState>,
) -> Response {
    let participant = match ParticipantId::new(participant_id) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, participant, state))
}

/// Liveness check.
pub async fn health_handler() -> &'static str {
    "ok"
}

/// Run one connection until either side closes.
async fn handle_socket(socket: WebSocket, participant: ParticipantId, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = ConnectionId::new();

    let mut group_rx: broadcast::Receiver<String> =
        state.rooms.join(&participant, connection_id.clone()).await;

    tracing::info!(
        participant_id = %participant,
        connection_id = %connection_id,
        "Relay connection opened"
    );

    let connected = RelayNotice::Connected(ConnectedNotice {
        participant_id: participant.to_string(),
        connection_id: connection_id.to_string(),
        timestamp: Timestamp::now().as_datetime().to_rfc3339(),
    });
    if let Err(e) = send_notice(&mut sender, &connected).await {
        tracing::debug!("Failed to send connected notice: {}", e);
        state.rooms.leave(&connection_id).await;
        return;
    }

    // Notices for this connection only; group frames go through group_rx.
    let (notice_tx, mut notice_rx) = tokio::sync::mpsc::channel::<RelayNotice>(16);

    let mut send_task = {
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    frame = group_rx.recv() => match frame {
                        Ok(frame) => sender.send(Message::Text(frame)).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                skipped,
                                "Connection lagged, frames dropped"
                            );
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    notice = notice_rx.recv() => match notice {
                        Some(notice) => send_notice(&mut sender, &notice).await,
                        None => break,
                    },
                };
                if let Err(e) = result {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "Send error, closing connection: {}",
                        e
                    );
                    break;
                }
            }
        })
    };

    let rooms = state.rooms.clone();
    let sender_id = participant.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if let Err(notice) = relay_frame(&rooms, &sender_id, &text).await {
                        let _ = notice_tx.send(notice).await;
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(participant_id = %sender_id, "Received unsupported binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::debug!(participant_id = %sender_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(participant_id = %sender_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.rooms.leave(&connection_id).await;
    tracing::info!(
        participant_id = %participant,
        connection_id = %connection_id,
        "Relay connection closed"
    );
}

/// Validate one inbound envelope and forward its message.
async fn relay_frame(
    rooms: &RoomManager,
    sender_id: &ParticipantId,
    text: &str,
) -> Result<usize, RelayNotice> {
    let envelope = decode_envelope(text).map_err(|e| {
        tracing::warn!(participant_id = %sender_id, error = %e, "Rejected relay frame");
        error_notice(ErrorCode::ValidationFailed, e.to_string())
    })?;

    let frame = encode(&envelope.message)
        .map_err(|e| error_notice(ErrorCode::InternalError, e.to_string()))?;

    let reached = rooms.broadcast(&envelope.to, frame).await;
    tracing::debug!(
        participant_id = %sender_id,
        recipient = %envelope.to,
        kind = envelope.message.kind(),
        reached,
        "Relayed frame"
    );
    Ok(reached)
}

fn error_notice(code: ErrorCode, message: String) -> RelayNotice {
    RelayNotice::Error(ErrorNotice {
        code: code.to_string(),
        message,
        timestamp: Timestamp::now().as_datetime().to_rfc3339(),
    })
}

async fn send_notice(
    sender: &mut SplitSink<WebSocket, Message>,
    notice: &RelayNotice,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(notice).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

/// Router with the relay and health endpoints.
pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/ws/:participant_id", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
