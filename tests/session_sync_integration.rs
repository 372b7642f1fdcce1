//! Integration tests for live session synchronization.
//!
//! Two participant hubs share one in-memory channel, the same way two
//! client processes share a relay:
//! 1. alice challenges bob, bob accepts, both sides run a controller
//! 2. moves, resignations and takebacks travel as protocol messages
//! 3. administrative interrupts arrive on the participants' own groups
//!
//! Automated-opponent tests run on paused time so the 5 second bound is
//! observed without waiting for it.

use std::sync::Arc;
use std::time::Duration;

use chess_sync::adapters::{
    EngineRegistry, InMemoryChannel, InMemoryGameRecordStore, ScriptedEngine, ShakmatyRules,
};
use chess_sync::application::{MonotonicClock, SessionDeps, SessionHandle, SessionManager};
use chess_sync::config::SessionConfig;
use chess_sync::domain::chess::{Color, MoveIntent, Position};
use chess_sync::domain::foundation::{GameStatus, ParticipantId, Timestamp};
use chess_sync::domain::game::{
    ClockState, GameResult, ResultReason, SessionEnd, SessionError, SessionSnapshot,
    SessionUpdate, TakebackState, TerminationReason, TimeControl,
};
use chess_sync::domain::protocol::{
    decode, encode, MovePlayed, OpponentBanned, SessionTerminatedByAdmin, SyncMessage,
};
use chess_sync::ports::RealtimeChannel;

const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

// =============================================================================
// Test Infrastructure
// =============================================================================

fn pid(s: &str) -> ParticipantId {
    ParticipantId::new(s).unwrap()
}

fn mv(uci: &str) -> MoveIntent {
    MoveIntent::from_uci(uci).unwrap()
}

fn hub(name: &str, channel: &InMemoryChannel, engines: EngineRegistry) -> SessionManager {
    SessionManager::new(
        pid(name),
        name,
        SessionDeps {
            rules: Arc::new(ShakmatyRules::new()),
            channel: Arc::new(channel.clone()),
            clock: MonotonicClock::start(),
        },
        Arc::new(InMemoryGameRecordStore::new()),
        engines,
        SessionConfig::default(),
    )
}

/// Poll the session until `pred` holds.
async fn wait_for(
    handle: &SessionHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(WAIT, async {
        loop {
            let snapshot = handle.snapshot().await;
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("session did not reach the expected state in time")
}

async fn wait_for_session(hub: &SessionManager) -> SessionHandle {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(id) = hub.session_ids().await.pop() {
                if let Some(handle) = hub.session(&id).await {
                    return handle;
                }
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("session was not created in time")
}

struct Game {
    channel: InMemoryChannel,
    alice: SessionManager,
    bob: SessionManager,
    /// alice plays white
    white: SessionHandle,
    black: SessionHandle,
}

async fn start_game(time_control: TimeControl, tournament: bool) -> Game {
    let channel = InMemoryChannel::default();
    let alice = hub("alice", &channel, EngineRegistry::new());
    let bob = hub("bob", &channel, EngineRegistry::new());
    alice.start().await.unwrap();
    bob.start().await.unwrap();

    alice
        .challenge(&pid("bob"), Some(time_control), tournament)
        .await
        .unwrap();
    tokio::time::timeout(WAIT, async {
        while bob.pending_challenges().await.is_empty() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .unwrap();

    let black = bob.accept_challenge(&pid("alice")).await.unwrap();
    let white = wait_for_session(&alice).await;
    assert_eq!(white.session_id(), black.session_id());

    Game {
        channel,
        alice,
        bob,
        white,
        black,
    }
}

// =============================================================================
// Moves
// =============================================================================

#[tokio::test]
async fn e2e4_reaches_both_sides_and_switches_clocks() {
    let game = start_game(TimeControl::new(600, 0).unwrap(), false).await;

    game.white.make_move(mv("e2e4")).await.unwrap();

    let expected = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    let on_black = wait_for(&game.black, |s| s.moves.len() == 1).await;
    let on_white = game.white.snapshot().await;

    for snapshot in [&on_white, &on_black] {
        assert_eq!(snapshot.position.as_str(), expected);
        assert_eq!(snapshot.active_color, Color::Black);
        assert_eq!(snapshot.moves[0].algebraic_notation, "e4");
        assert_eq!(snapshot.status, GameStatus::Active);
    }
    assert_eq!(on_white.local_color, Color::White);
    assert_eq!(on_black.local_color, Color::Black);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = game.white.snapshot().await;
    assert_eq!(later.white_remaining_ms, on_white.white_remaining_ms);
    assert!(later.black_remaining_ms < on_white.black_remaining_ms);
}

#[tokio::test]
async fn full_game_to_checkmate_completes_on_both_sides() {
    let game = start_game(TimeControl::default(), false).await;

    game.white.make_move(mv("f2f3")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 1).await;
    game.black.make_move(mv("e7e5")).await.unwrap();
    wait_for(&game.white, |s| s.moves.len() == 2).await;
    game.white.make_move(mv("g2g4")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 3).await;
    game.black.make_move(mv("d8h4")).await.unwrap();

    let expected = SessionEnd::Completed {
        result: GameResult {
            winner: Some(Color::Black),
            reason: ResultReason::Checkmate,
        },
    };
    for handle in [&game.white, &game.black] {
        let snapshot = wait_for(handle, |s| s.status == GameStatus::Completed).await;
        assert_eq!(snapshot.end.as_ref(), Some(&expected));
        assert_eq!(snapshot.moves.len(), 4);
    }
}

#[tokio::test]
async fn duplicate_move_delivery_applies_once() {
    let game = start_game(TimeControl::default(), false).await;
    let mut spy = game.channel.subscribe(&pid("bob")).await.unwrap();

    game.white.make_move(mv("d2d4")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 1).await;

    let frame = loop {
        let frame = spy.recv().await.unwrap();
        if matches!(decode(&frame).unwrap(), SyncMessage::MovePlayed(_)) {
            break frame;
        }
    };
    game.channel.rooms().broadcast(&pid("bob"), frame.clone()).await;
    game.channel.rooms().broadcast(&pid("bob"), frame).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = game.black.snapshot().await;
    assert_eq!(snapshot.moves.len(), 1);
    assert_eq!(snapshot.active_color, Color::Black);
    assert_eq!(snapshot.status, GameStatus::Active);
}

#[tokio::test]
async fn divergent_position_terminates_receiver() {
    let game = start_game(TimeControl::default(), false).await;

    let forged = SyncMessage::MovePlayed(MovePlayed {
        session_id: game.black.session_id(),
        intent: mv("e2e4"),
        resulting_position: Position::new(
            "rnbqkbnr/pppppppp/8/8/8/4P3/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        ),
        mover_participant_id: pid("alice"),
        sequence_index: 1,
        generation: 0,
        applied_at: Timestamp::now(),
        clock: ClockState {
            white_remaining_ms: 600_000,
            black_remaining_ms: 600_000,
            running: Some(Color::Black),
            captured_at: Timestamp::now(),
        },
    });
    game.channel.emit(&pid("bob"), &forged).await.unwrap();

    let snapshot = wait_for(&game.black, |s| s.status == GameStatus::Terminated).await;
    assert_eq!(
        snapshot.end,
        Some(SessionEnd::Terminated {
            reason: TerminationReason::Divergence
        })
    );
    assert!(snapshot.moves.is_empty());
}

#[tokio::test]
async fn out_of_turn_local_move_is_rejected_without_effect() {
    let game = start_game(TimeControl::default(), false).await;

    let err = game.black.make_move(mv("e7e5")).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::NotYourTurn {
            expected: Color::White,
            attempted: Color::Black
        }
    );
    assert!(game.black.snapshot().await.moves.is_empty());
    assert!(game.white.snapshot().await.moves.is_empty());
}

// =============================================================================
// Interrupts and endings
// =============================================================================

#[tokio::test]
async fn ban_mid_game_terminates_and_rejects_later_moves() {
    let game = start_game(TimeControl::default(), false).await;
    game.white.make_move(mv("e2e4")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 1).await;

    let session_id = game.white.session_id();
    for recipient in ["alice", "bob"] {
        let ban = SyncMessage::OpponentBanned(OpponentBanned {
            session_id,
            banned_participant_id: pid("bob"),
            remaining_participant_id: pid("alice"),
        });
        game.channel.emit(&pid(recipient), &ban).await.unwrap();
    }

    for handle in [&game.white, &game.black] {
        let snapshot = wait_for(handle, |s| s.status == GameStatus::Terminated).await;
        assert_eq!(
            snapshot.end,
            Some(SessionEnd::Terminated {
                reason: TerminationReason::Banned {
                    participant: pid("bob")
                }
            })
        );
    }

    let err = game.black.make_move(mv("e7e5")).await.unwrap_err();
    assert_eq!(err, SessionError::NotActive(GameStatus::Terminated));

    tokio::time::timeout(WAIT, async {
        while game.alice.session(&session_id).await.is_some()
            || game.bob.session(&session_id).await.is_some()
        {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("routes were not removed");
}

#[tokio::test]
async fn admin_termination_is_final() {
    let game = start_game(TimeControl::default(), false).await;
    let mut updates = game.white.subscribe();

    let message = SyncMessage::SessionTerminatedByAdmin(SessionTerminatedByAdmin {
        session_id: game.white.session_id(),
    });
    game.channel.emit(&pid("alice"), &message).await.unwrap();

    let end = tokio::time::timeout(WAIT, async {
        loop {
            if let SessionUpdate::Ended { end, .. } = updates.recv().await.unwrap() {
                return end;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(
        end,
        SessionEnd::Terminated {
            reason: TerminationReason::Admin
        }
    );
    assert_eq!(
        game.white.resign().await,
        Err(SessionError::NotActive(GameStatus::Terminated))
    );
}

#[tokio::test]
async fn resignation_completes_both_sides() {
    let game = start_game(TimeControl::default(), false).await;

    let result = game.black.resign().await.unwrap();
    assert_eq!(result, GameResult::resignation(Color::Black));

    let snapshot = wait_for(&game.white, |s| s.status == GameStatus::Completed).await;
    assert_eq!(snapshot.end, Some(SessionEnd::Completed { result }));
}

#[tokio::test(start_paused = true)]
async fn clock_runs_out_once_on_both_sides() {
    let game = start_game(TimeControl::new(2, 0).unwrap(), false).await;
    let mut updates = game.black.subscribe();

    for handle in [&game.white, &game.black] {
        let mut latest = handle.latest();
        let snapshot = latest
            .wait_for(|s| s.status == GameStatus::Completed)
            .await
            .unwrap()
            .clone();
        assert_eq!(
            snapshot.end,
            Some(SessionEnd::Completed {
                result: GameResult::timeout(Color::White)
            })
        );
        assert_eq!(snapshot.white_remaining_ms, 0);
    }

    let mut endings = 0;
    while let Ok(update) = updates.try_recv() {
        if update.is_final() {
            endings += 1;
        }
    }
    assert_eq!(endings, 1);
}

// =============================================================================
// Takeback
// =============================================================================

#[tokio::test]
async fn accepted_takeback_rewinds_both_sides() {
    let game = start_game(TimeControl::default(), true).await;

    game.white.make_move(mv("e2e4")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 1).await;

    game.white.request_takeback().await.unwrap();
    wait_for(&game.black, |s| s.takeback == TakebackState::Requested).await;
    assert_eq!(
        game.white.request_takeback().await,
        Err(SessionError::TakebackPending)
    );

    game.black.respond_takeback(true).await.unwrap();

    for handle in [&game.black, &game.white] {
        let snapshot = wait_for(handle, |s| s.moves.is_empty()).await;
        assert_eq!(snapshot.position, Position::standard());
        assert_eq!(snapshot.active_color, Color::White);
        assert_eq!(snapshot.takeback, TakebackState::None);
    }

    // play resumes in the new generation on both sides
    game.white.make_move(mv("d2d4")).await.unwrap();
    let snapshot = wait_for(&game.black, |s| s.moves.len() == 1).await;
    assert_eq!(snapshot.moves[0].intent, mv("d2d4"));
}

#[tokio::test]
async fn declined_takeback_leaves_game_unchanged() {
    let game = start_game(TimeControl::default(), true).await;

    game.white.make_move(mv("g1f3")).await.unwrap();
    wait_for(&game.black, |s| s.moves.len() == 1).await;

    game.white.request_takeback().await.unwrap();
    wait_for(&game.black, |s| s.takeback == TakebackState::Requested).await;
    game.black.respond_takeback(false).await.unwrap();

    let snapshot = wait_for(&game.white, |s| s.takeback == TakebackState::None).await;
    assert_eq!(snapshot.moves.len(), 1);
    assert_eq!(snapshot.active_color, Color::Black);
}

#[tokio::test]
async fn takeback_is_refused_in_casual_games() {
    let game = start_game(TimeControl::default(), false).await;
    game.white.make_move(mv("e2e4")).await.unwrap();
    assert_eq!(
        game.white.request_takeback().await,
        Err(SessionError::TakebackNotAllowed)
    );
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn game_record_id_reaches_both_sides() {
    let game = start_game(TimeControl::default(), false).await;

    let on_black = wait_for(&game.black, |s| s.persisted_game_id.is_some()).await;
    let on_white = wait_for(&game.white, |s| s.persisted_game_id.is_some()).await;
    assert_eq!(on_black.persisted_game_id, on_white.persisted_game_id);
}

// =============================================================================
// Automated opponents
// =============================================================================

async fn next_bot_move(updates: &mut tokio::sync::broadcast::Receiver<SessionUpdate>, bot: Color) -> MoveIntent {
    loop {
        if let SessionUpdate::MoveApplied { applied, .. } = updates.recv().await.unwrap() {
            if applied.color == bot {
                return applied.intent;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn bot_reply_is_applied_through_move_path() {
    let channel = InMemoryChannel::default();
    let engine = ScriptedEngine::new("easy").with_move(mv("e7e5"));
    let alice = hub(
        "alice",
        &channel,
        EngineRegistry::new().with_engine(Arc::new(engine)),
    );

    let handle = alice
        .start_bot_game("easy", Color::White, TimeControl::default())
        .await
        .unwrap();
    let mut updates = handle.subscribe();

    handle.make_move(mv("e2e4")).await.unwrap();
    assert_eq!(next_bot_move(&mut updates, Color::Black).await, mv("e7e5"));

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.active_color, Color::White);
    assert_eq!(snapshot.remote_participant_id, pid("bot:easy"));
}

#[tokio::test(start_paused = true)]
async fn hanging_bot_gets_fallback_within_bound() {
    let channel = InMemoryChannel::default();
    let engine = ScriptedEngine::new("sloth").with_hang();
    let alice = hub(
        "alice",
        &channel,
        EngineRegistry::new().with_engine(Arc::new(engine)),
    );

    let handle = alice
        .start_bot_game("sloth", Color::White, TimeControl::default())
        .await
        .unwrap();
    let mut updates = handle.subscribe();

    handle.make_move(mv("e2e4")).await.unwrap();
    let requested_at = tokio::time::Instant::now();
    next_bot_move(&mut updates, Color::Black).await;
    assert!(requested_at.elapsed() <= Duration::from_secs(5) + Duration::from_millis(100));

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.moves.len(), 2);
    assert_eq!(snapshot.active_color, Color::White);
    assert_eq!(snapshot.status, GameStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn bot_playing_white_moves_first() {
    let channel = InMemoryChannel::default();
    let engine = ScriptedEngine::new("opener").with_move(mv("c2c4"));
    let alice = hub(
        "alice",
        &channel,
        EngineRegistry::new().with_engine(Arc::new(engine)),
    );

    let handle = alice
        .start_bot_game("opener", Color::Black, TimeControl::default())
        .await
        .unwrap();

    let snapshot = wait_for(&handle, |s| s.moves.len() == 1).await;
    assert_eq!(snapshot.moves[0].intent, mv("c2c4"));
    assert_eq!(snapshot.moves[0].color, Color::White);

    handle.make_move(mv("e7e5")).await.unwrap();
}

#[tokio::test]
async fn undecodable_frames_are_ignored() {
    let game = start_game(TimeControl::default(), false).await;

    game.channel
        .rooms()
        .broadcast(&pid("bob"), "{\"type\":\"teleport\"}".to_string())
        .await;
    game.channel
        .rooms()
        .broadcast(&pid("bob"), "not json".to_string())
        .await;

    game.white.make_move(mv("e2e4")).await.unwrap();
    let snapshot = wait_for(&game.black, |s| s.moves.len() == 1).await;
    assert_eq!(snapshot.status, GameStatus::Active);

    // a valid encoding still routes afterwards
    let frame = encode(&SyncMessage::SessionTerminatedByAdmin(SessionTerminatedByAdmin {
        session_id: game.black.session_id(),
    }))
    .unwrap();
    game.channel.rooms().broadcast(&pid("bob"), frame).await;
    wait_for(&game.black, |s| s.status == GameStatus::Terminated).await;
}
