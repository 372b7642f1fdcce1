//! Session controller - the single writer of one game session.
//!
//! Each session runs on its own task. Inbound protocol messages, local
//! actions, clock deadlines and automated-opponent answers are serialized
//! onto that task, so the session state is never touched concurrently.
//!
//! # Event flow
//!
//! ```text
//! SessionHandle ──┐
//!  (local acts)   │   mpsc        ┌────────────────────┐  emit   ┌──────────┐
//!                 ├─────────────► │ SessionController  │ ──────► │ channel  │
//! participant hub │               │  GameSession       │         └──────────┘
//!  (inbound msgs) ┘               │  DeliveryLedger    │  broadcast
//!   clock deadline ─────────────► │  AutomatedOpponent │ ──────► SessionUpdate
//!   bot answer ─────────────────► └────────────────────┘
//! ```
//!
//! Local violations are returned to the caller. The same violations arriving
//! from the remote peer are logged and dropped.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::automated_opponent::{AutomatedOpponent, BotMove, MoveSource, OpponentError, PendingMove};
use super::time::MonotonicClock;
use crate::config::SessionConfig;
use crate::domain::chess::{Color, MoveIntent};
use crate::domain::foundation::{GameRecordId, GameStatus, SessionId, StateMachine, Timestamp};
use crate::domain::game::{
    AppliedMove, GameResult, GameSession, ResultReason, SessionError, SessionSnapshot,
    SessionUpdate, TerminationReason,
};
use crate::domain::protocol::{
    DeliveryLedger, GameRecordAssigned, IdempotencyKey, MovePlayed, OpponentBanned,
    OpponentResigned, SyncMessage, TakebackMessage,
};
use crate::ports::{RealtimeChannel, RulesEngine};

// ════════════════════════════════════════════════════════════════════════════
// Events
// ════════════════════════════════════════════════════════════════════════════

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Everything that can happen to a session, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A decoded message from the real-time channel.
    Inbound(SyncMessage),

    /// The local participant moves.
    LocalMove {
        intent: MoveIntent,
        reply: Reply<AppliedMove>,
    },

    /// The local participant resigns.
    Resign { reply: Reply<GameResult> },

    RequestTakeback { reply: Reply<()> },

    RespondTakeback { accept: bool, reply: Reply<()> },

    /// The persistence call made by this side resolved.
    GameRecordCreated(GameRecordId),

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

// ════════════════════════════════════════════════════════════════════════════
// SessionHandle
// ════════════════════════════════════════════════════════════════════════════

/// Cloneable handle to a running session.
///
/// Every method enqueues an event and, where relevant, waits for the
/// controller's answer. Once the session has ended, actions fail with
/// `NotActive` carrying the final status.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    session_id: SessionId,
    events: mpsc::Sender<SessionEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    latest: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Move for the local participant.
    pub async fn make_move(&self, intent: MoveIntent) -> Result<AppliedMove, SessionError> {
        self.request(|reply| SessionEvent::LocalMove { intent, reply })
            .await
    }

    pub async fn resign(&self) -> Result<GameResult, SessionError> {
        self.request(|reply| SessionEvent::Resign { reply }).await
    }

    /// Ask the opponent to take back the last move (tournament sessions).
    pub async fn request_takeback(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionEvent::RequestTakeback { reply })
            .await
    }

    /// Answer the opponent's outstanding takeback request.
    pub async fn respond_takeback(&self, accept: bool) -> Result<(), SessionError> {
        self.request(|reply| SessionEvent::RespondTakeback { accept, reply })
            .await
    }

    /// Current state with live clock values, or the final state once the
    /// session has ended.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.events.send(SessionEvent::Snapshot { reply }).await.is_ok() {
            if let Ok(snapshot) = rx.await {
                return snapshot;
            }
        }
        self.latest.borrow().clone()
    }

    /// Change notifications published after each state change.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Snapshot published after the most recent state change.
    pub fn latest(&self) -> watch::Receiver<SessionSnapshot> {
        self.latest.clone()
    }

    /// Whether the controller task has stopped.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Hand an inbound message to the controller.
    pub(crate) async fn deliver(&self, message: SyncMessage) -> Result<(), SessionError> {
        self.events
            .send(SessionEvent::Inbound(message))
            .await
            .map_err(|_| self.closed_error())
    }

    pub(crate) async fn game_record_created(&self, id: GameRecordId) -> Result<(), SessionError> {
        self.events
            .send(SessionEvent::GameRecordCreated(id))
            .await
            .map_err(|_| self.closed_error())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionEvent,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(build(reply))
            .await
            .map_err(|_| self.closed_error())?;
        rx.await.map_err(|_| self.closed_error())?
    }

    fn closed_error(&self) -> SessionError {
        let status = self.latest.borrow().status;
        if status.is_terminal() {
            SessionError::NotActive(status)
        } else {
            SessionError::Closed
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SessionController
// ════════════════════════════════════════════════════════════════════════════

/// Collaborators shared by every controller of one participant.
#[derive(Clone)]
pub struct SessionDeps {
    pub rules: Arc<dyn RulesEngine>,
    pub channel: Arc<dyn RealtimeChannel>,
    pub clock: MonotonicClock,
}

/// Drives one [`GameSession`] from `Pending` to a terminal status.
pub struct SessionController {
    session: GameSession,
    rules: Arc<dyn RulesEngine>,
    channel: Arc<dyn RealtimeChannel>,
    clock: MonotonicClock,
    /// Plays the remote color when the opponent is automated.
    opponent: Option<AutomatedOpponent>,
    /// Outstanding bot request and the sequence index it was made for.
    pending_bot: Option<(PendingMove, u32)>,
    /// Sequence index for which the bot could produce no move at all.
    bot_stalled_at: Option<u32>,
    ledger: DeliveryLedger,
    events: mpsc::Receiver<SessionEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    latest: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Create the controller for a pending session and start its task.
    ///
    /// The session is activated as soon as the task starts; events sent
    /// through the handle before then are processed afterwards.
    pub fn spawn(
        session: GameSession,
        deps: SessionDeps,
        opponent: Option<AutomatedOpponent>,
        config: &SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let (updates, _) = broadcast::channel(config.update_capacity);
        let (latest_tx, latest_rx) = watch::channel(session.snapshot(deps.clock.now()));

        let handle = SessionHandle {
            session_id: session.id(),
            events: events_tx,
            updates: updates.clone(),
            latest: latest_rx,
        };

        let controller = SessionController {
            session,
            rules: deps.rules,
            channel: deps.channel,
            clock: deps.clock,
            opponent,
            pending_bot: None,
            bot_stalled_at: None,
            ledger: DeliveryLedger::new(),
            events: events_rx,
            updates,
            latest: latest_tx,
        };

        let task = tokio::spawn(controller.run());
        (handle, task)
    }

    async fn run(mut self) {
        let now = self.clock.now();
        if let Err(e) = self.session.activate(self.rules.as_ref(), now) {
            tracing::error!(session_id = %self.session.id(), error = %e, "Session failed to start");
            return;
        }
        tracing::info!(
            session_id = %self.session.id(),
            local = %self.session.local_participant(),
            remote = %self.session.remote_participant(),
            local_color = %self.session.local_color(),
            time_control = %self.session.time_control(),
            "Session started"
        );
        self.publish(SessionUpdate::Started {
            session_id: self.session.id(),
        });

        while !self.session.status().is_terminal() {
            self.schedule_bot();
            let deadline = self
                .session
                .clock()
                .deadline()
                .map(|(_, at)| self.clock.instant_at(at));

            // A passed deadline wins over anything queued behind it.
            tokio::select! {
                biased;
                _ = sleep_until_deadline(deadline) => self.on_deadline(),
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::info!(session_id = %self.session.id(), "All handles dropped, closing session");
                        break;
                    }
                },
                answer = next_bot_answer(&mut self.pending_bot) => self.on_bot_answer(answer).await,
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some((pending, _)) = self.pending_bot.take() {
            pending.cancel();
        }
        if let Some(opponent) = self.opponent.as_mut() {
            opponent.cancel();
        }

        // Answer anything that raced with the end of the session.
        self.events.close();
        let status = self.session.status();
        while let Ok(event) = self.events.try_recv() {
            reject_event(event, status, self.session.snapshot(self.clock.now()));
        }
        tracing::debug!(session_id = %self.session.id(), status = %status, "Session controller stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Inbound(message) => self.on_inbound(message).await,
            SessionEvent::LocalMove { intent, reply } => {
                let _ = reply.send(self.local_move(intent).await);
            }
            SessionEvent::Resign { reply } => {
                let _ = reply.send(self.local_resign().await);
            }
            SessionEvent::RequestTakeback { reply } => {
                let _ = reply.send(self.local_request_takeback().await);
            }
            SessionEvent::RespondTakeback { accept, reply } => {
                let _ = reply.send(self.local_respond_takeback(accept).await);
            }
            SessionEvent::GameRecordCreated(id) => self.on_game_record_created(id).await,
            SessionEvent::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot(self.clock.now()));
            }
        }
    }

    async fn on_inbound(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::MovePlayed(m) => self.on_move_played(m).await,
            SyncMessage::OpponentResigned(m) => self.on_opponent_resigned(m),
            SyncMessage::SessionTerminatedByAdmin(_) => {
                self.terminate(TerminationReason::Admin);
            }
            SyncMessage::OpponentBanned(m) => self.on_opponent_banned(m),
            SyncMessage::TakebackRequested(m) => self.on_takeback_requested(m),
            SyncMessage::TakebackAccepted(m) => self.on_takeback_answered(m, true),
            SyncMessage::TakebackDeclined(m) => self.on_takeback_answered(m, false),
            SyncMessage::GameRecordAssigned(m) => self.on_game_record_assigned(m),
            other @ (SyncMessage::Challenge(_) | SyncMessage::ChallengeAccepted(_)) => {
                tracing::debug!(
                    session_id = %self.session.id(),
                    kind = other.kind(),
                    "Ignoring session setup message for running session"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Moves
    // ─────────────────────────────────────────────────────────────────────────

    async fn local_move(&mut self, intent: MoveIntent) -> Result<AppliedMove, SessionError> {
        let mover = self.session.local_color();
        let now = self.clock.now();
        let applied = self.apply(mover, intent, now)?;

        self.after_move(&applied, now);

        let message = SyncMessage::MovePlayed(MovePlayed {
            session_id: self.session.id(),
            intent,
            resulting_position: self.session.position().clone(),
            mover_participant_id: self.session.local_participant().clone(),
            sequence_index: applied.sequence_index,
            generation: self.session.generation(),
            applied_at: now,
            clock: self.session.clock().state(now),
        });
        self.send_to_remote(&message).await;
        self.classify(now);

        Ok(applied)
    }

    async fn on_move_played(&mut self, m: MovePlayed) {
        let session_id = self.session.id();
        let key = IdempotencyKey::new(session_id, m.generation, m.sequence_index);

        if self.opponent.is_some() || &m.mover_participant_id != self.session.remote_participant() {
            tracing::warn!(
                session_id = %session_id,
                participant_id = %m.mover_participant_id,
                "Dropping move from a participant who is not the remote player"
            );
            return;
        }
        if self.ledger.contains(&key) {
            tracing::debug!(
                session_id = %session_id,
                sequence_index = m.sequence_index,
                generation = m.generation,
                "Dropping duplicate move delivery"
            );
            return;
        }
        if m.generation != self.session.generation() {
            tracing::warn!(
                session_id = %session_id,
                sequence_index = m.sequence_index,
                generation = m.generation,
                current_generation = self.session.generation(),
                "Dropping move from another takeback generation"
            );
            return;
        }
        let expected = self.session.next_sequence_index();
        if m.sequence_index != expected {
            tracing::warn!(
                session_id = %session_id,
                sequence_index = m.sequence_index,
                expected,
                "Dropping out-of-sequence move"
            );
            return;
        }

        let mover = self.session.remote_color();
        let preview = match self
            .session
            .preview_move(self.rules.as_ref(), mover, &m.intent)
        {
            Ok(preview) => preview,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    sequence_index = m.sequence_index,
                    mv = %m.intent,
                    reason = %e,
                    "Dropping rejected remote move"
                );
                return;
            }
        };

        if preview.position.digest() != m.resulting_position.digest() {
            tracing::error!(
                session_id = %session_id,
                sequence_index = m.sequence_index,
                local_hash = %preview.position.digest(),
                remote_hash = %m.resulting_position.digest(),
                "Positions diverged, aborting session"
            );
            self.terminate(TerminationReason::Divergence);
            return;
        }

        let now = self.clock.now();
        let applied_at = self.clamp_remote_time(m.applied_at, now);
        match self.apply(mover, m.intent, applied_at) {
            Ok(applied) => {
                self.ledger.record(key);
                if self.session.reconcile_clock(m.clock) {
                    tracing::debug!(
                        session_id = %session_id,
                        sequence_index = m.sequence_index,
                        "Adopted remote clock for the mover"
                    );
                }
                self.after_move(&applied, applied_at);
                self.classify(now);
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, reason = %e, "Dropping remote move");
            }
        }
    }

    /// Apply a move, ending the session if the mover's flag fell first.
    fn apply(
        &mut self,
        mover: Color,
        intent: MoveIntent,
        at: Timestamp,
    ) -> Result<AppliedMove, SessionError> {
        let outcome = self
            .session
            .apply_move(self.rules.as_ref(), mover, intent, at);
        if let Err(SessionError::TimeExpired(result)) = &outcome {
            tracing::info!(
                session_id = %self.session.id(),
                result = %result,
                mv = %intent,
                "Clock ran out before the move"
            );
            self.publish_end();
        }
        outcome
    }

    /// Remote timestamps are trusted only within `[last tick, now]`.
    fn clamp_remote_time(&self, applied_at: Timestamp, now: Timestamp) -> Timestamp {
        let floor = self
            .session
            .move_log()
            .last()
            .map(|m| m.applied_at)
            .or(self.session.started_at())
            .unwrap_or(now);
        applied_at.max(floor).min(now)
    }

    fn after_move(&mut self, applied: &AppliedMove, at: Timestamp) {
        tracing::debug!(
            session_id = %self.session.id(),
            sequence_index = applied.sequence_index,
            color = %applied.color,
            san = %applied.algebraic_notation,
            "Move applied"
        );
        self.publish(SessionUpdate::MoveApplied {
            session_id: self.session.id(),
            applied: applied.clone(),
            clock: self.session.clock().state(at),
        });
    }

    /// Complete the session if the new position is terminal.
    fn classify(&mut self, now: Timestamp) {
        match self.rules.classify(self.session.position()) {
            Ok(Some(termination)) => {
                let result = GameResult::from_termination(termination, self.session.active_color());
                self.complete(result, now);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(session_id = %self.session.id(), error = %e, "Failed to classify position");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Automated opponent
    // ─────────────────────────────────────────────────────────────────────────

    /// Request a bot move when it is the bot's turn, and drop requests made
    /// for a position that no longer stands.
    fn schedule_bot(&mut self) {
        let Some(opponent) = self.opponent.as_mut() else {
            return;
        };
        let ply = self.session.next_sequence_index();
        let bot_to_move = self.session.status() == GameStatus::Active
            && self.session.active_color() == self.session.remote_color();

        if let Some((pending, requested_for)) = &self.pending_bot {
            if bot_to_move && *requested_for == ply {
                return;
            }
            pending.cancel();
            self.pending_bot = None;
        }

        if bot_to_move && self.bot_stalled_at != Some(ply) {
            tracing::debug!(
                session_id = %self.session.id(),
                engine = %opponent.engine_name(),
                sequence_index = ply,
                "Requesting automated move"
            );
            let pending = opponent.request_move(self.session.position().clone());
            self.pending_bot = Some((pending, ply));
        }
    }

    async fn on_bot_answer(&mut self, answer: Result<BotMove, OpponentError>) {
        let Some((_, requested_for)) = self.pending_bot.take() else {
            return;
        };
        let session_id = self.session.id();

        let bot_move = match answer {
            Ok(bot_move) => bot_move,
            Err(OpponentError::Cancelled) => return,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Automated opponent produced no move");
                self.bot_stalled_at = Some(requested_for);
                return;
            }
        };

        if requested_for != self.session.next_sequence_index() {
            tracing::debug!(session_id = %session_id, "Discarding automated move for a stale position");
            return;
        }

        if let MoveSource::Fallback(reason) = &bot_move.source {
            tracing::info!(
                session_id = %session_id,
                sequence_index = requested_for,
                mv = %bot_move.intent,
                reason = ?reason,
                "Playing fallback move for automated opponent"
            );
        }

        let mover = self.session.remote_color();
        let now = self.clock.now();
        match self.apply(mover, bot_move.intent, now) {
            Ok(applied) => {
                self.after_move(&applied, now);
                self.classify(now);
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Automated move rejected");
                self.bot_stalled_at = Some(requested_for);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    fn on_deadline(&mut self) {
        let now = self.clock.now();
        if let Some(result) = self.session.check_timeout(now) {
            tracing::info!(session_id = %self.session.id(), result = %result, "Clock ran out");
            self.publish_end();
        }
    }

    async fn local_resign(&mut self) -> Result<GameResult, SessionError> {
        let result = GameResult::resignation(self.session.local_color());
        self.session.complete(result, self.clock.now())?;
        tracing::info!(session_id = %self.session.id(), result = %result, "Local participant resigned");

        let message = SyncMessage::OpponentResigned(OpponentResigned {
            session_id: self.session.id(),
            result,
        });
        self.send_to_remote(&message).await;
        self.publish_end();
        Ok(result)
    }

    fn on_opponent_resigned(&mut self, m: OpponentResigned) {
        let expected = GameResult::resignation(self.session.remote_color());
        if m.result.reason != ResultReason::Resignation || m.result.winner != expected.winner {
            tracing::warn!(
                session_id = %self.session.id(),
                result = %m.result,
                "Dropping resignation with inconsistent result"
            );
            return;
        }
        self.complete(expected, self.clock.now());
    }

    fn on_opponent_banned(&mut self, m: OpponentBanned) {
        if !self.session.has_participant(&m.banned_participant_id) {
            tracing::warn!(
                session_id = %self.session.id(),
                participant_id = %m.banned_participant_id,
                "Dropping ban naming a non-participant"
            );
            return;
        }
        self.terminate(TerminationReason::Banned {
            participant: m.banned_participant_id,
        });
    }

    fn on_game_record_assigned(&mut self, m: GameRecordAssigned) {
        if &m.sender_id != self.session.remote_participant() {
            tracing::warn!(
                session_id = %self.session.id(),
                participant_id = %m.sender_id,
                "Dropping game record from a non-opponent"
            );
            return;
        }
        match self.session.persisted_game_id() {
            Some(current) if current == m.persisted_game_id => return,
            Some(current) => {
                tracing::warn!(
                    session_id = %self.session.id(),
                    current = %current,
                    offered = %m.persisted_game_id,
                    "Dropping conflicting game record"
                );
                return;
            }
            None => {}
        }
        self.session.assign_game_record(m.persisted_game_id);
        self.publish(SessionUpdate::GameRecordAssigned {
            session_id: self.session.id(),
            game_record_id: m.persisted_game_id,
        });
    }

    async fn on_game_record_created(&mut self, id: GameRecordId) {
        self.session.assign_game_record(id);
        self.publish(SessionUpdate::GameRecordAssigned {
            session_id: self.session.id(),
            game_record_id: id,
        });
        let message = SyncMessage::GameRecordAssigned(GameRecordAssigned {
            session_id: self.session.id(),
            sender_id: self.session.local_participant().clone(),
            persisted_game_id: id,
        });
        self.send_to_remote(&message).await;
    }

    fn complete(&mut self, result: GameResult, now: Timestamp) {
        match self.session.complete(result, now) {
            Ok(()) => {
                tracing::info!(session_id = %self.session.id(), result = %result, "Session completed");
                self.publish_end();
            }
            Err(e) => {
                tracing::debug!(session_id = %self.session.id(), reason = %e, "Ignoring completion");
            }
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        match self.session.terminate(reason.clone(), self.clock.now()) {
            Ok(()) => {
                tracing::info!(session_id = %self.session.id(), reason = %reason, "Session terminated");
                self.publish_end();
            }
            Err(e) => {
                tracing::debug!(session_id = %self.session.id(), reason = %e, "Ignoring termination");
            }
        }
    }

    fn publish_end(&mut self) {
        if let Some(end) = self.session.end().cloned() {
            self.publish(SessionUpdate::Ended {
                session_id: self.session.id(),
                end,
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Takeback
    // ─────────────────────────────────────────────────────────────────────────

    fn takeback_message(&self) -> TakebackMessage {
        TakebackMessage {
            session_id: self.session.id(),
            sender_id: self.session.local_participant().clone(),
            generation: self.session.generation(),
            sequence_index: self.session.move_log().len() as u32,
        }
    }

    /// Whether a takeback message refers to the current last move.
    fn takeback_is_current(&self, m: &TakebackMessage) -> bool {
        if &m.sender_id != self.session.remote_participant() {
            tracing::warn!(
                session_id = %self.session.id(),
                participant_id = %m.sender_id,
                "Dropping takeback message from a non-opponent"
            );
            return false;
        }
        if m.generation != self.session.generation()
            || m.sequence_index as usize != self.session.move_log().len()
        {
            tracing::debug!(
                session_id = %self.session.id(),
                generation = m.generation,
                sequence_index = m.sequence_index,
                "Dropping stale takeback message"
            );
            return false;
        }
        true
    }

    async fn local_request_takeback(&mut self) -> Result<(), SessionError> {
        let message = self.takeback_message();
        let by = self.session.local_color();
        self.session.request_takeback(by)?;
        self.publish(SessionUpdate::TakebackRequested {
            session_id: self.session.id(),
            by,
        });
        self.send_to_remote(&SyncMessage::TakebackRequested(message))
            .await;
        Ok(())
    }

    async fn local_respond_takeback(&mut self, accept: bool) -> Result<(), SessionError> {
        let message = self.takeback_message();
        let responder = self.session.local_color();
        if accept {
            self.accept_takeback(responder)?;
            self.send_to_remote(&SyncMessage::TakebackAccepted(message))
                .await;
        } else {
            self.session.decline_takeback(responder)?;
            self.publish(SessionUpdate::TakebackDeclined {
                session_id: self.session.id(),
            });
            self.send_to_remote(&SyncMessage::TakebackDeclined(message))
                .await;
        }
        Ok(())
    }

    fn on_takeback_requested(&mut self, m: TakebackMessage) {
        if !self.takeback_is_current(&m) {
            return;
        }
        let by = self.session.remote_color();
        match self.session.request_takeback(by) {
            Ok(()) => self.publish(SessionUpdate::TakebackRequested {
                session_id: self.session.id(),
                by,
            }),
            Err(e) => {
                tracing::warn!(session_id = %self.session.id(), reason = %e, "Dropping takeback request");
            }
        }
    }

    fn on_takeback_answered(&mut self, m: TakebackMessage, accepted: bool) {
        if !self.takeback_is_current(&m) {
            return;
        }
        let responder = self.session.remote_color();
        let outcome = if accepted {
            self.accept_takeback(responder)
        } else {
            self.session.decline_takeback(responder).map(|()| {
                self.publish(SessionUpdate::TakebackDeclined {
                    session_id: self.session.id(),
                })
            })
        };
        if let Err(e) = outcome {
            tracing::warn!(session_id = %self.session.id(), reason = %e, "Dropping takeback answer");
        }
    }

    fn accept_takeback(&mut self, responder: Color) -> Result<(), SessionError> {
        let now = self.clock.now();
        let removed = self
            .session
            .accept_takeback(self.rules.as_ref(), responder, now)?;
        tracing::info!(
            session_id = %self.session.id(),
            sequence_index = removed.sequence_index,
            generation = self.session.generation(),
            "Move taken back"
        );
        self.publish(SessionUpdate::TakebackAccepted {
            session_id: self.session.id(),
            removed,
            clock: self.session.clock().state(now),
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────────────────

    /// Emit to the remote participant's group. Automated opponents have no
    /// group, so nothing is sent in bot games.
    async fn send_to_remote(&self, message: &SyncMessage) {
        if self.opponent.is_some() {
            return;
        }
        let recipient = self.session.remote_participant();
        if let Err(e) = self.channel.emit(recipient, message).await {
            tracing::warn!(
                session_id = %self.session.id(),
                participant_id = %recipient,
                kind = message.kind(),
                error = %e,
                "Failed to emit message"
            );
        }
    }

    fn publish(&mut self, update: SessionUpdate) {
        self.latest
            .send_replace(self.session.snapshot(self.clock.now()));
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

fn reject_event(event: SessionEvent, status: GameStatus, snapshot: SessionSnapshot) {
    let err = SessionError::NotActive(status);
    match event {
        SessionEvent::LocalMove { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        SessionEvent::Resign { reply } => {
            let _ = reply.send(Err(err));
        }
        SessionEvent::RequestTakeback { reply } | SessionEvent::RespondTakeback { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        SessionEvent::Snapshot { reply } => {
            let _ = reply.send(snapshot);
        }
        SessionEvent::Inbound(_) | SessionEvent::GameRecordCreated(_) => {}
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_bot_answer(
    pending: &mut Option<(PendingMove, u32)>,
) -> Result<BotMove, OpponentError> {
    match pending {
        Some((request, _)) => request.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryChannel, ScriptedEngine, ShakmatyRules};
    use crate::domain::chess::Position;
    use crate::domain::foundation::ParticipantId;
    use crate::domain::game::{ClockState, SessionEnd, SessionSetup, TakebackState, TimeControl};
    use crate::domain::protocol::{decode, SessionTerminatedByAdmin};
    use std::time::Duration;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    fn mv(uci: &str) -> MoveIntent {
        MoveIntent::from_uci(uci).unwrap()
    }

    struct Harness {
        handle: SessionHandle,
        task: JoinHandle<()>,
        channel: InMemoryChannel,
        session_id: SessionId,
    }

    fn start(local_color: Color, tournament: bool, time_control: TimeControl) -> Harness {
        start_with(local_color, tournament, time_control, None)
    }

    fn start_with(
        local_color: Color,
        tournament: bool,
        time_control: TimeControl,
        opponent: Option<AutomatedOpponent>,
    ) -> Harness {
        let channel = InMemoryChannel::default();
        let clock = MonotonicClock::start();
        let session_id = SessionId::new();
        let session = GameSession::new(
            SessionSetup {
                session_id,
                persisted_game_id: None,
                local: pid("alice"),
                remote: pid("bob"),
                local_color,
                time_control,
                tournament,
            },
            clock.now(),
        );
        let deps = SessionDeps {
            rules: Arc::new(ShakmatyRules::new()),
            channel: Arc::new(channel.clone()),
            clock,
        };
        let (handle, task) =
            SessionController::spawn(session, deps, opponent, &SessionConfig::default());
        Harness {
            handle,
            task,
            channel,
            session_id,
        }
    }

    /// A `movePlayed` from bob as the real peer would produce it.
    fn remote_move(
        session_id: SessionId,
        before: &Position,
        uci: &str,
        sequence_index: u32,
        generation: u32,
    ) -> SyncMessage {
        let rules = ShakmatyRules::new();
        let applied = rules.apply_move(before, &mv(uci)).unwrap();
        let now = Timestamp::now();
        SyncMessage::MovePlayed(MovePlayed {
            session_id,
            intent: mv(uci),
            resulting_position: applied.position,
            mover_participant_id: pid("bob"),
            sequence_index,
            generation,
            applied_at: now,
            clock: ClockState {
                white_remaining_ms: 600_000,
                black_remaining_ms: 600_000,
                running: None,
                captured_at: now,
            },
        })
    }

    #[tokio::test]
    async fn local_move_applies_and_emits_move_played() {
        let h = start(Color::White, false, TimeControl::default());
        let mut bob_rx = h.channel.subscribe(&pid("bob")).await.unwrap();

        let applied = h.handle.make_move(mv("e2e4")).await.unwrap();
        assert_eq!(applied.sequence_index, 1);

        let snapshot = h.handle.snapshot().await;
        assert_eq!(
            snapshot.position.as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(snapshot.active_color, Color::Black);

        match decode(&bob_rx.recv().await.unwrap()).unwrap() {
            SyncMessage::MovePlayed(m) => {
                assert_eq!(m.intent, mv("e2e4"));
                assert_eq!(m.resulting_position, snapshot.position);
                assert_eq!(m.mover_participant_id, pid("alice"));
                assert_eq!(m.sequence_index, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_turn_violation_is_reported() {
        let h = start(Color::Black, false, TimeControl::default());
        let err = h.handle.make_move(mv("e7e5")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotYourTurn { .. }));
        assert!(h.handle.snapshot().await.moves.is_empty());
    }

    #[tokio::test]
    async fn local_illegal_move_is_reported() {
        let h = start(Color::White, false, TimeControl::default());
        let err = h.handle.make_move(mv("e2e5")).await.unwrap_err();
        assert!(matches!(err, SessionError::Rules(_)));
    }

    #[tokio::test]
    async fn duplicate_inbound_move_applies_once() {
        let h = start(Color::Black, false, TimeControl::default());
        let message = remote_move(h.session_id, &Position::standard(), "e2e4", 1, 0);

        h.handle.deliver(message.clone()).await.unwrap();
        h.handle.deliver(message).await.unwrap();

        let snapshot = h.handle.snapshot().await;
        assert_eq!(snapshot.moves.len(), 1);
        assert_eq!(snapshot.active_color, Color::Black);
    }

    #[tokio::test]
    async fn inbound_out_of_turn_move_is_dropped() {
        let h = start(Color::White, false, TimeControl::default());
        // bob is black; white has not moved yet
        let message = remote_move(
            h.session_id,
            &Position::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1"),
            "e7e5",
            1,
            0,
        );
        h.handle.deliver(message).await.unwrap();

        let snapshot = h.handle.snapshot().await;
        assert!(snapshot.moves.is_empty());
        assert_eq!(snapshot.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn inbound_move_from_stranger_is_dropped() {
        let h = start(Color::Black, false, TimeControl::default());
        let mut message = remote_move(h.session_id, &Position::standard(), "e2e4", 1, 0);
        if let SyncMessage::MovePlayed(m) = &mut message {
            m.mover_participant_id = pid("mallory");
        }
        h.handle.deliver(message).await.unwrap();
        assert!(h.handle.snapshot().await.moves.is_empty());
    }

    #[tokio::test]
    async fn divergent_position_aborts_session() {
        let h = start(Color::Black, false, TimeControl::default());
        let mut message = remote_move(h.session_id, &Position::standard(), "e2e4", 1, 0);
        if let SyncMessage::MovePlayed(m) = &mut message {
            m.resulting_position = Position::new("8/8/8/4k3/8/8/8/4K3 b - - 0 1");
        }
        h.handle.deliver(message).await.unwrap();
        h.task.await.unwrap();

        let snapshot = h.handle.latest().borrow().clone();
        assert_eq!(snapshot.status, GameStatus::Terminated);
        assert_eq!(
            snapshot.end,
            Some(SessionEnd::Terminated {
                reason: TerminationReason::Divergence
            })
        );
    }

    #[tokio::test]
    async fn admin_termination_rejects_later_moves() {
        let h = start(Color::White, false, TimeControl::default());
        h.handle
            .deliver(SyncMessage::SessionTerminatedByAdmin(SessionTerminatedByAdmin {
                session_id: h.session_id,
            }))
            .await
            .unwrap();
        h.task.await.unwrap();

        let err = h.handle.make_move(mv("e2e4")).await.unwrap_err();
        assert_eq!(err, SessionError::NotActive(GameStatus::Terminated));
    }

    #[tokio::test]
    async fn ban_of_unrelated_participant_is_ignored() {
        let h = start(Color::White, false, TimeControl::default());
        h.handle
            .deliver(SyncMessage::OpponentBanned(OpponentBanned {
                session_id: h.session_id,
                banned_participant_id: pid("mallory"),
                remaining_participant_id: pid("alice"),
            }))
            .await
            .unwrap();
        assert_eq!(h.handle.snapshot().await.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn resign_completes_and_notifies_opponent() {
        let h = start(Color::White, false, TimeControl::default());
        let mut bob_rx = h.channel.subscribe(&pid("bob")).await.unwrap();

        let result = h.handle.resign().await.unwrap();
        assert_eq!(result.winner, Some(Color::Black));

        match decode(&bob_rx.recv().await.unwrap()).unwrap() {
            SyncMessage::OpponentResigned(m) => assert_eq!(m.result, result),
            other => panic!("unexpected {other:?}"),
        }
        h.task.await.unwrap();
        assert_eq!(h.handle.latest().borrow().status, GameStatus::Completed);
    }

    #[tokio::test]
    async fn inconsistent_resignation_is_dropped() {
        let h = start(Color::White, false, TimeControl::default());
        // claims alice (white) lost, but bob is the one resigning
        h.handle
            .deliver(SyncMessage::OpponentResigned(OpponentResigned {
                session_id: h.session_id,
                result: GameResult::resignation(Color::White),
            }))
            .await
            .unwrap();
        assert_eq!(h.handle.snapshot().await.status, GameStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_timeout_completes_session() {
        let h = start(Color::White, false, TimeControl::new(3, 0).unwrap());
        let mut updates = h.handle.subscribe();

        tokio::time::sleep(Duration::from_secs(4)).await;
        h.task.await.unwrap();

        let snapshot = h.handle.latest().borrow().clone();
        assert_eq!(snapshot.status, GameStatus::Completed);
        assert_eq!(snapshot.white_remaining_ms, 0);
        match snapshot.end {
            Some(SessionEnd::Completed { result }) => {
                assert_eq!(result.reason, ResultReason::Timeout);
                assert_eq!(result.winner, Some(Color::Black));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut ended = 0;
        while let Ok(update) = updates.try_recv() {
            if update.is_final() {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn move_after_flag_fall_is_refused() {
        let h = start(Color::White, false, TimeControl::new(3, 2).unwrap());
        let mut updates = h.handle.subscribe();

        tokio::time::advance(Duration::from_secs(4)).await;
        let err = h.handle.make_move(mv("e2e4")).await.unwrap_err();
        assert!(
            matches!(
                err,
                SessionError::TimeExpired(_) | SessionError::NotActive(GameStatus::Completed)
            ),
            "unexpected {err:?}"
        );
        h.task.await.unwrap();

        let snapshot = h.handle.latest().borrow().clone();
        assert!(snapshot.moves.is_empty());
        assert_eq!(snapshot.white_remaining_ms, 0);
        assert_eq!(
            snapshot.end,
            Some(SessionEnd::Completed {
                result: GameResult::timeout(Color::White)
            })
        );

        let mut ended = 0;
        while let Ok(update) = updates.try_recv() {
            if update.is_final() {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn remote_clock_report_caps_movers_time() {
        let h = start(Color::Black, false, TimeControl::default());
        let mut message = remote_move(h.session_id, &Position::standard(), "e2e4", 1, 0);
        if let SyncMessage::MovePlayed(m) = &mut message {
            m.clock = ClockState {
                white_remaining_ms: 590_000,
                black_remaining_ms: 600_000,
                running: Some(Color::Black),
                captured_at: m.applied_at,
            };
        }
        h.handle.deliver(message).await.unwrap();

        let snapshot = h.handle.snapshot().await;
        assert_eq!(snapshot.moves.len(), 1);
        assert_eq!(snapshot.white_remaining_ms, 590_000);
    }

    #[tokio::test]
    async fn game_record_is_taken_only_from_opponent_once() {
        let h = start(Color::White, false, TimeControl::default());
        let first = GameRecordId::new();
        let assign = |sender: &str, id: GameRecordId| {
            SyncMessage::GameRecordAssigned(GameRecordAssigned {
                session_id: h.session_id,
                sender_id: pid(sender),
                persisted_game_id: id,
            })
        };

        h.handle.deliver(assign("mallory", first)).await.unwrap();
        assert_eq!(h.handle.snapshot().await.persisted_game_id, None);

        h.handle.deliver(assign("bob", first)).await.unwrap();
        h.handle.deliver(assign("bob", GameRecordId::new())).await.unwrap();
        assert_eq!(h.handle.snapshot().await.persisted_game_id, Some(first));
    }

    #[tokio::test]
    async fn fools_mate_completes_with_checkmate() {
        let h = start(Color::White, false, TimeControl::default());
        let rules = ShakmatyRules::new();

        h.handle.make_move(mv("f2f3")).await.unwrap();
        let p1 = h.handle.snapshot().await.position;
        h.handle
            .deliver(remote_move(h.session_id, &p1, "e7e5", 2, 0))
            .await
            .unwrap();
        h.handle.make_move(mv("g2g4")).await.unwrap();
        let p3 = h.handle.snapshot().await.position;
        h.handle
            .deliver(remote_move(h.session_id, &p3, "d8h4", 4, 0))
            .await
            .unwrap();
        h.task.await.unwrap();

        let snapshot = h.handle.latest().borrow().clone();
        assert!(rules.is_checkmate(&snapshot.position).unwrap());
        assert_eq!(
            snapshot.end,
            Some(SessionEnd::Completed {
                result: GameResult {
                    winner: Some(Color::Black),
                    reason: ResultReason::Checkmate
                }
            })
        );
    }

    #[tokio::test]
    async fn takeback_accept_by_local_side() {
        let h = start(Color::Black, true, TimeControl::default());
        let mut bob_rx = h.channel.subscribe(&pid("bob")).await.unwrap();

        h.handle
            .deliver(remote_move(h.session_id, &Position::standard(), "e2e4", 1, 0))
            .await
            .unwrap();
        h.handle
            .deliver(SyncMessage::TakebackRequested(TakebackMessage {
                session_id: h.session_id,
                sender_id: pid("bob"),
                generation: 0,
                sequence_index: 1,
            }))
            .await
            .unwrap();
        assert_eq!(h.handle.snapshot().await.takeback, TakebackState::Requested);

        h.handle.respond_takeback(true).await.unwrap();

        let snapshot = h.handle.snapshot().await;
        assert!(snapshot.moves.is_empty());
        assert_eq!(snapshot.position, Position::standard());
        assert_eq!(snapshot.active_color, Color::White);

        match decode(&bob_rx.recv().await.unwrap()).unwrap() {
            SyncMessage::TakebackAccepted(m) => {
                assert_eq!(m.sequence_index, 1);
                assert_eq!(m.generation, 0);
            }
            other => panic!("unexpected {other:?}"),
        }

        // bob replays a different first move in the next generation
        h.handle
            .deliver(remote_move(h.session_id, &Position::standard(), "d2d4", 1, 1))
            .await
            .unwrap();
        assert_eq!(h.handle.snapshot().await.moves[0].intent, mv("d2d4"));
    }

    #[tokio::test]
    async fn takeback_not_available_outside_tournaments() {
        let h = start(Color::White, false, TimeControl::default());
        h.handle.make_move(mv("e2e4")).await.unwrap();
        assert_eq!(
            h.handle.request_takeback().await,
            Err(SessionError::TakebackNotAllowed)
        );
    }

    #[tokio::test]
    async fn stale_takeback_answer_is_dropped() {
        let h = start(Color::White, true, TimeControl::default());
        h.handle.make_move(mv("e2e4")).await.unwrap();
        h.handle.request_takeback().await.unwrap();

        h.handle
            .deliver(SyncMessage::TakebackAccepted(TakebackMessage {
                session_id: h.session_id,
                sender_id: pid("bob"),
                generation: 3,
                sequence_index: 1,
            }))
            .await
            .unwrap();

        let snapshot = h.handle.snapshot().await;
        assert_eq!(snapshot.moves.len(), 1);
        assert_eq!(snapshot.takeback, TakebackState::Requested);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_timeout_plays_fallback_and_advances_turn() {
        let engine = ScriptedEngine::new("sloth").with_hang();
        let opponent = AutomatedOpponent::new(
            Arc::new(engine),
            Arc::new(ShakmatyRules::new()),
            Duration::from_secs(5),
        );
        let h = start_with(Color::White, false, TimeControl::default(), Some(opponent));
        let mut updates = h.handle.subscribe();

        h.handle.make_move(mv("e2e4")).await.unwrap();

        let bot_move = loop {
            match updates.recv().await.unwrap() {
                SessionUpdate::MoveApplied { applied, .. } if applied.color == Color::Black => {
                    break applied
                }
                _ => {}
            }
        };
        assert_eq!(bot_move.sequence_index, 2);

        let snapshot = h.handle.snapshot().await;
        assert_eq!(snapshot.active_color, Color::White);
        assert_eq!(snapshot.status, GameStatus::Active);
        // bot's clock was charged the full wait
        assert!(snapshot.black_remaining_ms <= 595_000);
    }
}
