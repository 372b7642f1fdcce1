//! GameSession aggregate - one participant's record of a live game.
//!
//! # Invariants
//!
//! - `active_color` equals the color to move in `position`
//! - replaying `move_log` from `initial_position` reproduces `position`
//! - exactly one participant is white; colors never change
//! - the running clock belongs to `active_color` while `Active`, and no
//!   clock runs afterwards
//! - `status` only moves forward: `Pending -> Active -> {Completed, Terminated}`
//!
//! Only the session controller holds a mutable reference.

use serde::{Deserialize, Serialize};

use super::clock::{ClockState, MoveClock};
use super::outcome::{GameResult, SessionEnd, TerminationReason};
use super::takeback::{TakebackNegotiation, TakebackState};
use super::{SessionError, TimeControl};
use crate::domain::chess::{Color, MoveApplication, MoveIntent, PieceKind, Position, Square};
use crate::domain::foundation::{
    GameRecordId, GameStatus, ParticipantId, SessionId, StateMachine, Timestamp,
};
use crate::ports::RulesEngine;

/// Everything needed to create a session once two participants are matched.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub session_id: SessionId,
    pub persisted_game_id: Option<GameRecordId>,
    pub local: ParticipantId,
    pub remote: ParticipantId,
    pub local_color: Color,
    pub time_control: TimeControl,
    /// Tournament sessions allow takeback negotiation.
    pub tournament: bool,
}

/// A move once applied to the log. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMove {
    #[serde(rename = "move")]
    pub intent: MoveIntent,
    pub color: Color,
    pub piece_kind: PieceKind,
    pub origin_square: Square,
    pub algebraic_notation: String,
    /// 1-based ply number.
    pub sequence_index: u32,
    pub applied_at: Timestamp,
}

/// Read-only view of a session for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub persisted_game_id: Option<GameRecordId>,
    pub local_participant_id: ParticipantId,
    pub remote_participant_id: ParticipantId,
    pub local_color: Color,
    pub position: Position,
    pub moves: Vec<AppliedMove>,
    pub active_color: Color,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    pub status: GameStatus,
    pub end: Option<SessionEnd>,
    pub takeback: TakebackState,
    pub started_at: Option<Timestamp>,
}

/// One participant's authoritative-enough record of a live game.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: SessionId,
    persisted_game_id: Option<GameRecordId>,
    local: ParticipantId,
    remote: ParticipantId,
    local_color: Color,
    time_control: TimeControl,
    tournament: bool,
    initial_position: Position,
    position: Position,
    move_log: Vec<AppliedMove>,
    /// Clock state captured just before each logged move, for takeback.
    clock_history: Vec<ClockState>,
    active_color: Color,
    clock: MoveClock,
    status: GameStatus,
    end: Option<SessionEnd>,
    takeback: TakebackNegotiation,
    /// Number of accepted takebacks; part of the move idempotency key.
    generation: u32,
    started_at: Option<Timestamp>,
}

impl GameSession {
    /// Create a pending session.
    pub fn new(setup: SessionSetup, now: Timestamp) -> Self {
        Self {
            id: setup.session_id,
            persisted_game_id: setup.persisted_game_id,
            local: setup.local,
            remote: setup.remote,
            local_color: setup.local_color,
            time_control: setup.time_control,
            tournament: setup.tournament,
            initial_position: Position::standard(),
            position: Position::standard(),
            move_log: Vec::new(),
            clock_history: Vec::new(),
            active_color: Color::White,
            clock: MoveClock::new(setup.time_control.initial(), now),
            status: GameStatus::Pending,
            end: None,
            takeback: TakebackNegotiation::default(),
            generation: 0,
            started_at: None,
        }
    }

    /// `Pending -> Active`: load the starting position and start the clock
    /// of the side to move.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless pending
    /// - `Rules` if the engine cannot read its own starting position
    pub fn activate(&mut self, rules: &dyn RulesEngine, now: Timestamp) -> Result<(), SessionError> {
        let next = self.status.transition_to(GameStatus::Active)?;
        let initial = rules.initial_position();
        let to_move = rules.turn_color(&initial)?;

        self.initial_position = initial.clone();
        self.position = initial;
        self.active_color = to_move;
        self.clock = MoveClock::new(self.time_control.initial(), now);
        self.clock.start(to_move, now);
        self.status = next;
        self.started_at = Some(now);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Reference to the external game record, once persistence resolved.
    pub fn persisted_game_id(&self) -> Option<GameRecordId> {
        self.persisted_game_id
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    pub fn remote_participant(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn local_color(&self) -> Color {
        self.local_color
    }

    pub fn remote_color(&self) -> Color {
        self.local_color.opposite()
    }

    /// Color played by `participant`, if they belong to this session.
    pub fn color_of(&self, participant: &ParticipantId) -> Option<Color> {
        if participant == &self.local {
            Some(self.local_color)
        } else if participant == &self.remote {
            Some(self.remote_color())
        } else {
            None
        }
    }

    pub fn has_participant(&self, participant: &ParticipantId) -> bool {
        self.color_of(participant).is_some()
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn is_tournament(&self) -> bool {
        self.tournament
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn move_log(&self) -> &[AppliedMove] {
        &self.move_log
    }

    pub fn active_color(&self) -> Color {
        self.active_color
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn end(&self) -> Option<&SessionEnd> {
        self.end.as_ref()
    }

    pub fn clock(&self) -> &MoveClock {
        &self.clock
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn takeback_state(&self) -> TakebackState {
        self.takeback.state()
    }

    pub fn takeback_requested_by(&self) -> Option<Color> {
        self.takeback.requested_by()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    /// Sequence index the next applied move will carry.
    pub fn next_sequence_index(&self) -> u32 {
        self.move_log.len() as u32 + 1
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the external game reference once persistence resolves.
    pub fn assign_game_record(&mut self, id: GameRecordId) {
        self.persisted_game_id = Some(id);
    }

    /// Validate a move without applying it.
    ///
    /// # Errors
    ///
    /// - `NotActive` unless active
    /// - `NotYourTurn` if `mover` is not the color to move
    /// - `Rules` if the engine rejects the move
    pub fn preview_move(
        &self,
        rules: &dyn RulesEngine,
        mover: Color,
        intent: &MoveIntent,
    ) -> Result<MoveApplication, SessionError> {
        self.ensure_active()?;
        if mover != self.active_color {
            return Err(SessionError::NotYourTurn {
                expected: self.active_color,
                attempted: mover,
            });
        }
        Ok(rules.apply_move(&self.position, intent)?)
    }

    /// Validate and apply a move, switching clocks.
    ///
    /// An outstanding takeback request is dropped: it referred to a log
    /// that no longer ends where it did.
    ///
    /// # Errors
    ///
    /// - `TimeExpired` if the side to move has no time left at `now`; the
    ///   session is completed as a timeout before returning
    /// - otherwise the same as [`GameSession::preview_move`], and nothing
    ///   changes
    pub fn apply_move(
        &mut self,
        rules: &dyn RulesEngine,
        mover: Color,
        intent: MoveIntent,
        now: Timestamp,
    ) -> Result<AppliedMove, SessionError> {
        if let Some(result) = self.check_timeout(now) {
            return Err(SessionError::TimeExpired(result));
        }
        let application = self.preview_move(rules, mover, &intent)?;
        let next_to_move = rules.turn_color(&application.position)?;

        let applied = AppliedMove {
            intent,
            color: mover,
            piece_kind: application.piece_kind,
            origin_square: intent.from,
            algebraic_notation: application.san,
            sequence_index: self.next_sequence_index(),
            applied_at: now,
        };

        self.clock_history.push(self.clock.state(now));
        self.move_log.push(applied.clone());
        self.position = application.position;
        self.active_color = next_to_move;
        self.clock.start(next_to_move, now);
        self.clock.add(mover, self.time_control.increment());
        self.takeback.clear();

        Ok(applied)
    }

    /// `Active -> Completed`, stopping both clocks.
    pub fn complete(&mut self, result: GameResult, now: Timestamp) -> Result<(), SessionError> {
        self.status = self.status.transition_to(GameStatus::Completed)?;
        self.clock.stop(now);
        self.takeback.clear();
        self.end = Some(SessionEnd::Completed { result });
        Ok(())
    }

    /// `{Pending, Active} -> Terminated`. Irreversible.
    pub fn terminate(
        &mut self,
        reason: TerminationReason,
        now: Timestamp,
    ) -> Result<(), SessionError> {
        self.status = self.status.transition_to(GameStatus::Terminated)?;
        self.clock.stop(now);
        self.takeback.clear();
        self.end = Some(SessionEnd::Terminated { reason });
        Ok(())
    }

    /// Complete the game if the running side's time has run out.
    ///
    /// Returns the result only on the call that observed the timeout.
    pub fn check_timeout(&mut self, now: Timestamp) -> Option<GameResult> {
        if !self.status.accepts_moves() {
            return None;
        }
        let flagged = self.clock.check_timeout(now)?;
        let result = GameResult::timeout(flagged);
        self.complete(result, now).ok()?;
        Some(result)
    }

    /// Cap the last mover's remaining time at what the peer that applied
    /// the move reported for it.
    ///
    /// Returns `true` if the local clock changed.
    pub fn reconcile_clock(&mut self, reported: ClockState) -> bool {
        let Some(last) = self.move_log.last() else {
            return false;
        };
        if !self.status.accepts_moves() || reported.running != Some(self.active_color) {
            return false;
        }
        self.clock.reconcile(last.color, reported)
    }

    /// Raise a takeback request on behalf of `by`.
    ///
    /// # Errors
    ///
    /// - `NotActive`, `TakebackNotAllowed`, `NothingToTakeBack`
    /// - `TakebackPending` if one is already outstanding
    pub fn request_takeback(&mut self, by: Color) -> Result<(), SessionError> {
        self.ensure_takeback_possible()?;
        self.takeback.request(by)
    }

    /// Accept the outstanding request: pop the last move, rebuild the
    /// position by replay and rewind the clocks to before that move.
    ///
    /// Returns the move that was taken back.
    pub fn accept_takeback(
        &mut self,
        rules: &dyn RulesEngine,
        responder: Color,
        now: Timestamp,
    ) -> Result<AppliedMove, SessionError> {
        self.ensure_takeback_possible()?;

        // Compute everything fallible before touching state.
        let kept: Vec<MoveIntent> = self.move_log[..self.move_log.len() - 1]
            .iter()
            .map(|m| m.intent)
            .collect();
        let position = rules.replay(&self.initial_position, &kept)?;
        let to_move = rules.turn_color(&position)?;

        self.takeback.answer(responder, true)?;
        let popped = self
            .move_log
            .pop()
            .ok_or(SessionError::NothingToTakeBack)?;
        let clock_before = self
            .clock_history
            .pop()
            .ok_or(SessionError::NothingToTakeBack)?;

        self.position = position;
        self.active_color = to_move;
        self.clock.restore(&clock_before, Some(to_move), now);
        self.generation += 1;
        Ok(popped)
    }

    /// Decline the outstanding request. No game state changes.
    pub fn decline_takeback(&mut self, responder: Color) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.takeback.answer(responder, false).map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Replay the move log from the initial position.
    pub fn replayed_position(&self, rules: &dyn RulesEngine) -> Result<Position, SessionError> {
        let moves: Vec<MoveIntent> = self.move_log.iter().map(|m| m.intent).collect();
        Ok(rules.replay(&self.initial_position, &moves)?)
    }

    /// Read-only view as of `now`.
    pub fn snapshot(&self, now: Timestamp) -> SessionSnapshot {
        let clock = self.clock.state(now);
        SessionSnapshot {
            session_id: self.id,
            persisted_game_id: self.persisted_game_id,
            local_participant_id: self.local.clone(),
            remote_participant_id: self.remote.clone(),
            local_color: self.local_color,
            position: self.position.clone(),
            moves: self.move_log.clone(),
            active_color: self.active_color,
            white_remaining_ms: clock.white_remaining_ms,
            black_remaining_ms: clock.black_remaining_ms,
            status: self.status,
            end: self.end.clone(),
            takeback: self.takeback.state(),
            started_at: self.started_at,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.status.accepts_moves() {
            Ok(())
        } else {
            Err(SessionError::NotActive(self.status))
        }
    }

    fn ensure_takeback_possible(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.tournament {
            return Err(SessionError::TakebackNotAllowed);
        }
        if self.move_log.is_empty() {
            return Err(SessionError::NothingToTakeBack);
        }
        Ok(())
    }
}
