//! Scripted move engine for testing.
//!
//! Replies are consumed in order. Each reply can be a move, an error, or a
//! hang that never resolves, which lets tests drive the opponent adapter's
//! timeout and failure paths deterministically.
//!
//! ```ignore
//! let engine = ScriptedEngine::new("scripted")
//!     .with_move(MoveIntent::from_uci("e7e5")?)
//!     .with_hang();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::domain::chess::{MoveIntent, Position};
use crate::ports::{EngineError, MoveEngine};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Move(MoveIntent),
    Error(EngineError),
    /// Never answer.
    Hang,
}

/// Engine answering from a queue of scripted replies.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    name: String,
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_move(self, mv: MoveIntent) -> Self {
        self.push(ScriptedReply::Move(mv));
        self
    }

    pub fn with_error(self, error: EngineError) -> Self {
        self.push(ScriptedReply::Error(error));
        self
    }

    pub fn with_hang(self) -> Self {
        self.push(ScriptedReply::Hang);
        self
    }

    /// Simulated thinking time before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append a reply after construction.
    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Number of moves requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl MoveEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn best_move(&self, _position: &Position) -> Result<MoveIntent, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self.next_reply() {
            Some(ScriptedReply::Move(mv)) => Ok(mv),
            Some(ScriptedReply::Error(e)) => Err(e),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(EngineError::NoMove),
        }
    }
}
