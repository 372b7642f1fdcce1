//! Participant hub - one per participant process.
//!
//! Owns the subscription to the participant's broadcast group, decodes every
//! frame centrally, keeps incoming challenges until they are answered, and
//! routes session-scoped messages to the controller of that session.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use super::automated_opponent::AutomatedOpponent;
use super::session_controller::{SessionController, SessionDeps, SessionHandle};
use crate::adapters::EngineRegistry;
use crate::config::{SessionConfig, ValidationError as ConfigValidationError};
use crate::domain::chess::Color;
use crate::domain::foundation::{ParticipantId, SessionId, ValidationError};
use crate::domain::game::{GameSession, SessionSetup, TimeControl};
use crate::domain::protocol::{decode, Challenge, ChallengeAccepted, ColorAssignment, SyncMessage};
use crate::ports::{ChannelError, EngineError, GameRecordStore, NewGameRecord};

/// Errors from hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("no pending challenge from {0}")]
    NoSuchChallenge(ParticipantId),

    #[error("cannot challenge yourself")]
    SelfChallenge,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigValidationError),
}

/// Terms of a challenge this participant sent and is waiting on.
#[derive(Debug, Clone, Copy)]
struct OutgoingChallenge {
    time_control: TimeControl,
    tournament: bool,
}

/// A running session as seen by the router.
///
/// Inbound messages go through a per-session forwarder, so a session with a
/// full event queue only delays its own messages.
struct Route {
    handle: SessionHandle,
    inbox: mpsc::UnboundedSender<SyncMessage>,
}

struct HubState {
    participant: ParticipantId,
    display_name: String,
    deps: SessionDeps,
    store: Arc<dyn GameRecordStore>,
    engines: EngineRegistry,
    config: SessionConfig,
    sessions: RwLock<HashMap<SessionId, Route>>,
    incoming: RwLock<HashMap<ParticipantId, Challenge>>,
    outgoing: RwLock<HashMap<ParticipantId, OutgoingChallenge>>,
}

/// Session registry and message router for one participant.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<HubState>,
}

impl SessionManager {
    pub fn new(
        participant: ParticipantId,
        display_name: impl Into<String>,
        deps: SessionDeps,
        store: Arc<dyn GameRecordStore>,
        engines: EngineRegistry,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Arc::new(HubState {
                participant,
                display_name: display_name.into(),
                deps,
                store,
                engines,
                config,
                sessions: RwLock::new(HashMap::new()),
                incoming: RwLock::new(HashMap::new()),
                outgoing: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.state.participant
    }

    /// Subscribe to this participant's group and start routing.
    ///
    /// The subscription is in place when this returns, so messages emitted
    /// afterwards are not missed.
    pub async fn start(&self) -> Result<JoinHandle<()>, ChannelError> {
        let frames = self
            .state
            .deps
            .channel
            .subscribe(&self.state.participant)
            .await?;
        let hub = self.clone();
        Ok(tokio::spawn(async move { hub.route(frames).await }))
    }

    async fn route(self, mut frames: broadcast::Receiver<String>) {
        let participant = self.state.participant.clone();
        loop {
            match frames.recv().await {
                Ok(frame) => match decode(&frame) {
                    Ok(message) => self.dispatch(message).await,
                    Err(e) => {
                        tracing::warn!(participant_id = %participant, error = %e, "Dropping undecodable frame");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(participant_id = %participant, skipped, "Router lagged behind channel");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(participant_id = %participant, "Channel closed, router stopping");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, message: SyncMessage) {
        match message {
            SyncMessage::Challenge(challenge) => self.on_challenge(challenge).await,
            SyncMessage::ChallengeAccepted(accepted) => self.on_challenge_accepted(accepted).await,
            other => {
                let Some(session_id) = other.session_id() else {
                    return;
                };
                let inbox = self
                    .state
                    .sessions
                    .read()
                    .await
                    .get(&session_id)
                    .map(|route| route.inbox.clone());
                match inbox {
                    Some(inbox) => {
                        if inbox.send(other).is_err() {
                            tracing::debug!(session_id = %session_id, "Session no longer accepts messages");
                        }
                    }
                    None => {
                        tracing::debug!(
                            participant_id = %self.state.participant,
                            session_id = %session_id,
                            kind = other.kind(),
                            "Dropping message for unknown session"
                        );
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Challenges
    // ─────────────────────────────────────────────────────────────────────────

    /// Propose a session to `opponent`. The challenger plays white.
    ///
    /// Without a time control the configured default is offered.
    pub async fn challenge(
        &self,
        opponent: &ParticipantId,
        time_control: Option<TimeControl>,
        tournament: bool,
    ) -> Result<(), HubError> {
        if opponent == &self.state.participant {
            return Err(HubError::SelfChallenge);
        }
        let time_control = match time_control {
            Some(time_control) => time_control,
            None => self.state.config.default_time_control()?,
        };
        self.state.outgoing.write().await.insert(
            opponent.clone(),
            OutgoingChallenge {
                time_control,
                tournament,
            },
        );

        let message = SyncMessage::Challenge(Challenge {
            sender_id: self.state.participant.clone(),
            sender_name: self.state.display_name.clone(),
            time_control,
            tournament,
        });
        self.state.deps.channel.emit(opponent, &message).await?;
        tracing::info!(
            participant_id = %self.state.participant,
            opponent = %opponent,
            time_control = %time_control,
            "Challenge sent"
        );
        Ok(())
    }

    async fn on_challenge(&self, challenge: Challenge) {
        if challenge.sender_id == self.state.participant {
            return;
        }
        tracing::info!(
            participant_id = %self.state.participant,
            challenger = %challenge.sender_id,
            time_control = %challenge.time_control,
            "Challenge received"
        );
        self.state
            .incoming
            .write()
            .await
            .insert(challenge.sender_id.clone(), challenge);
    }

    /// Challenges received and not yet answered.
    pub async fn pending_challenges(&self) -> Vec<Challenge> {
        self.state.incoming.read().await.values().cloned().collect()
    }

    /// Forget a received challenge without answering it.
    pub async fn ignore_challenge(&self, sender: &ParticipantId) -> bool {
        self.state.incoming.write().await.remove(sender).is_some()
    }

    /// Accept the challenge from `sender` and start the session.
    ///
    /// The game record is created in the background; the session starts
    /// without it and both sides learn the id once it resolves.
    pub async fn accept_challenge(&self, sender: &ParticipantId) -> Result<SessionHandle, HubError> {
        let challenge = self
            .state
            .incoming
            .write()
            .await
            .remove(sender)
            .ok_or_else(|| HubError::NoSuchChallenge(sender.clone()))?;

        let colors = ColorAssignment {
            white: challenge.sender_id.clone(),
            black: self.state.participant.clone(),
        };
        let setup = SessionSetup {
            session_id: SessionId::new(),
            persisted_game_id: None,
            local: self.state.participant.clone(),
            remote: challenge.sender_id.clone(),
            local_color: Color::Black,
            time_control: challenge.time_control,
            tournament: challenge.tournament,
        };
        let session_id = setup.session_id;
        let handle = self.launch(setup, None).await;

        let message = SyncMessage::ChallengeAccepted(ChallengeAccepted {
            session_id,
            persisted_game_id: None,
            opponent_id: self.state.participant.clone(),
            opponent_name: self.state.display_name.clone(),
            time_control: challenge.time_control,
            colors: colors.clone(),
            tournament: challenge.tournament,
        });
        self.state.deps.channel.emit(sender, &message).await?;

        self.persist(
            &handle,
            NewGameRecord {
                session_id,
                white: colors.white,
                black: colors.black,
                time_control: challenge.time_control,
                tournament: challenge.tournament,
                created_at: self.state.deps.clock.now(),
            },
        );
        Ok(handle)
    }

    async fn on_challenge_accepted(&self, accepted: ChallengeAccepted) {
        let participant = &self.state.participant;
        let Some(terms) = self.state.outgoing.write().await.remove(&accepted.opponent_id) else {
            tracing::warn!(
                participant_id = %participant,
                opponent = %accepted.opponent_id,
                "Dropping acceptance of a challenge never sent"
            );
            return;
        };

        let Some(local_color) = accepted.colors.color_of(participant) else {
            tracing::warn!(session_id = %accepted.session_id, "Dropping acceptance that does not seat us");
            return;
        };
        if accepted.colors.color_of(&accepted.opponent_id) != Some(local_color.opposite()) {
            tracing::warn!(session_id = %accepted.session_id, "Dropping acceptance with inconsistent colors");
            return;
        }
        if accepted.time_control != terms.time_control || accepted.tournament != terms.tournament {
            tracing::info!(
                session_id = %accepted.session_id,
                proposed = %terms.time_control,
                accepted = %accepted.time_control,
                "Opponent accepted with different terms"
            );
        }
        if self.state.sessions.read().await.contains_key(&accepted.session_id) {
            return;
        }

        tracing::info!(
            participant_id = %participant,
            session_id = %accepted.session_id,
            opponent = %accepted.opponent_name,
            "Challenge accepted"
        );
        let setup = SessionSetup {
            session_id: accepted.session_id,
            persisted_game_id: accepted.persisted_game_id,
            local: participant.clone(),
            remote: accepted.opponent_id,
            local_color,
            time_control: accepted.time_control,
            tournament: accepted.tournament,
        };
        self.launch(setup, None).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Automated opponents
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a session against the named engine.
    pub async fn start_bot_game(
        &self,
        engine_name: &str,
        local_color: Color,
        time_control: TimeControl,
    ) -> Result<SessionHandle, HubError> {
        let engine = self.state.engines.get(engine_name)?;
        let bot_id = ParticipantId::new(format!("bot:{engine_name}"))?;
        let opponent = AutomatedOpponent::new(
            engine,
            Arc::clone(&self.state.deps.rules),
            self.state.config.bot_move_timeout(),
        );

        let setup = SessionSetup {
            session_id: SessionId::new(),
            persisted_game_id: None,
            local: self.state.participant.clone(),
            remote: bot_id.clone(),
            local_color,
            time_control,
            tournament: false,
        };
        let session_id = setup.session_id;
        let (white, black) = match local_color {
            Color::White => (self.state.participant.clone(), bot_id),
            Color::Black => (bot_id, self.state.participant.clone()),
        };

        tracing::info!(
            participant_id = %self.state.participant,
            session_id = %session_id,
            engine = engine_name,
            "Starting game against automated opponent"
        );
        let handle = self.launch(setup, Some(opponent)).await;
        self.persist(
            &handle,
            NewGameRecord {
                session_id,
                white,
                black,
                time_control,
                tournament: false,
                created_at: self.state.deps.clock.now(),
            },
        );
        Ok(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn session(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.state
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|route| route.handle.clone())
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.state.sessions.read().await.keys().copied().collect()
    }

    /// Spawn the controller and register its route. The route is removed
    /// once the controller stops.
    async fn launch(&self, setup: SessionSetup, opponent: Option<AutomatedOpponent>) -> SessionHandle {
        let session_id = setup.session_id;
        let session = GameSession::new(setup, self.state.deps.clock.now());
        let (handle, task) = SessionController::spawn(
            session,
            self.state.deps.clone(),
            opponent,
            &self.state.config,
        );
        let (inbox, mut inbound) = mpsc::unbounded_channel();
        self.state.sessions.write().await.insert(
            session_id,
            Route {
                handle: handle.clone(),
                inbox,
            },
        );

        let forwarder = handle.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if let Err(e) = forwarder.deliver(message).await {
                    tracing::debug!(session_id = %session_id, reason = %e, "Session no longer accepts messages");
                    break;
                }
            }
        });

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(session_id = %session_id, error = %e, "Session controller panicked");
            }
            state.sessions.write().await.remove(&session_id);
            tracing::debug!(session_id = %session_id, "Session route removed");
        });

        handle
    }

    /// Create the game record in the background and hand the id to the
    /// controller when it resolves.
    fn persist(&self, handle: &SessionHandle, record: NewGameRecord) {
        let store = Arc::clone(&self.state.store);
        let handle = handle.clone();
        tokio::spawn(async move {
            let session_id = record.session_id;
            match store.create(record).await {
                Ok(id) => {
                    tracing::info!(session_id = %session_id, game_record_id = %id, "Game record created");
                    if let Err(e) = handle.game_record_created(id).await {
                        tracing::debug!(session_id = %session_id, reason = %e, "Session ended before record resolved");
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to create game record");
                }
            }
        });
    }
}
