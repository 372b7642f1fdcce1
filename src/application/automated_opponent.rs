//! Automated opponent adapter.
//!
//! Wraps a [`MoveEngine`] behind a cancellable "given a position, produce a
//! move" request. The session never waits on an engine indefinitely: after
//! `max_wait` the request is abandoned and a fallback move is played.
//! Engine errors and illegal engine moves count as one "adapter failure"
//! condition and also fall back; they are logged apart from timeouts.
//!
//! At most one request is outstanding per adapter. Issuing a new request
//! aborts the previous one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};

use crate::domain::chess::{MoveIntent, Position};
use crate::ports::{EngineError, MoveEngine, RulesEngine, RulesError};

/// Why a fallback move was played instead of the engine's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The engine did not answer within the maximum wait.
    Timeout,
    /// The engine failed or answered with an unusable move.
    AdapterFailure(EngineError),
}

/// Where a bot move came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveSource {
    Engine,
    Fallback(FallbackReason),
}

/// A move produced for the automated side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMove {
    pub intent: MoveIntent,
    pub source: MoveSource,
}

impl BotMove {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, MoveSource::Fallback(_))
    }
}

/// Conditions under which no move at all could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpponentError {
    #[error("no legal move available for fallback")]
    NoLegalMove,

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("move request was cancelled")]
    Cancelled,
}

/// An outstanding move request.
///
/// Await it for the move. Cancelling is idempotent: cancelling a request
/// that already resolved, or was already cancelled, does nothing.
#[derive(Debug)]
pub struct PendingMove {
    handle: JoinHandle<Result<BotMove, OpponentError>>,
}

impl PendingMove {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingMove {
    type Output = Result<BotMove, OpponentError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(_) => Err(OpponentError::Cancelled),
        })
    }
}

/// Adapter from a named engine to session moves.
pub struct AutomatedOpponent {
    engine: Arc<dyn MoveEngine>,
    rules: Arc<dyn RulesEngine>,
    max_wait: Duration,
    outstanding: Option<AbortHandle>,
}

impl AutomatedOpponent {
    pub fn new(engine: Arc<dyn MoveEngine>, rules: Arc<dyn RulesEngine>, max_wait: Duration) -> Self {
        Self {
            engine,
            rules,
            max_wait,
            outstanding: None,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Ask for a move in `position`, aborting any earlier request.
    pub fn request_move(&mut self, position: Position) -> PendingMove {
        self.cancel();

        let engine = Arc::clone(&self.engine);
        let rules = Arc::clone(&self.rules);
        let max_wait = self.max_wait;
        let handle = tokio::spawn(async move { compute_move(engine, rules, position, max_wait).await });

        self.outstanding = Some(handle.abort_handle());
        PendingMove { handle }
    }

    /// Abort the outstanding request, if any.
    pub fn cancel(&mut self) {
        if let Some(previous) = self.outstanding.take() {
            if !previous.is_finished() {
                tracing::debug!(engine = %self.engine.name(), "Cancelling outstanding move request");
            }
            previous.abort();
        }
    }
}

impl Drop for AutomatedOpponent {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn compute_move(
    engine: Arc<dyn MoveEngine>,
    rules: Arc<dyn RulesEngine>,
    position: Position,
    max_wait: Duration,
) -> Result<BotMove, OpponentError> {
    let reason = match tokio::time::timeout(max_wait, engine.best_move(&position)).await {
        Ok(Ok(intent)) => match rules.apply_move(&position, &intent) {
            Ok(_) => {
                return Ok(BotMove {
                    intent,
                    source: MoveSource::Engine,
                })
            }
            Err(_) => {
                tracing::warn!(
                    engine = %engine.name(),
                    mv = %intent,
                    "Engine proposed an illegal move, using fallback"
                );
                FallbackReason::AdapterFailure(EngineError::Malformed(format!(
                    "illegal move {}",
                    intent
                )))
            }
        },
        Ok(Err(error)) => {
            tracing::warn!(
                engine = %engine.name(),
                error = %error,
                "Engine failed, using fallback"
            );
            FallbackReason::AdapterFailure(error)
        }
        Err(_) => {
            tracing::warn!(
                engine = %engine.name(),
                waited_ms = max_wait.as_millis() as u64,
                "Engine timed out, using fallback"
            );
            FallbackReason::Timeout
        }
    };

    let intent = fallback_move(rules.as_ref(), &position)?;
    Ok(BotMove {
        intent,
        source: MoveSource::Fallback(reason),
    })
}

/// The designated fallback: the first legal move the rules engine lists.
pub fn fallback_move(rules: &dyn RulesEngine, position: &Position) -> Result<MoveIntent, OpponentError> {
    rules
        .legal_moves(position, None)?
        .into_iter()
        .next()
        .map(|legal| legal.intent)
        .ok_or(OpponentError::NoLegalMove)
}
