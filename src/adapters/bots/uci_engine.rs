//! UCI engine process adapter.
//!
//! Each request spawns the configured executable, feeds it the position
//! and waits for its `bestmove` line. The child is killed when the request
//! future is dropped, so cancelling a pending move also ends the process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::domain::chess::{MoveIntent, Position};
use crate::ports::{EngineError, MoveEngine};

/// A UCI-speaking executable.
#[derive(Debug, Clone)]
pub struct UciEngine {
    name: String,
    command: String,
    args: Vec<String>,
    movetime_ms: u64,
}

impl UciEngine {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            movetime_ms: 1_000,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &EngineConfig) -> Self {
        Self::new(name, config.command.clone())
            .with_args(config.args_list())
            .with_movetime(config.movetime_ms)
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Thinking time requested per move.
    pub fn with_movetime(mut self, movetime_ms: u64) -> Self {
        self.movetime_ms = movetime_ms;
        self
    }

    fn script(&self, position: &Position) -> String {
        format!(
            "uci\nisready\nucinewgame\nposition fen {}\ngo movetime {}\n",
            position, self.movetime_ms
        )
    }
}

#[async_trait]
impl MoveEngine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn best_move(&self, position: &Position) -> Result<MoveIntent, EngineError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Crashed("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Crashed("stdout unavailable".to_string()))?;

        stdin
            .write_all(self.script(position).as_bytes())
            .await
            .map_err(|e| EngineError::Crashed(format!("write failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| EngineError::Crashed(format!("write failed: {}", e)))?;

        let mut lines = BufReader::new(stdout).lines();
        let answer = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(answer) = parse_bestmove(&line) {
                        break answer;
                    }
                    tracing::trace!(engine = %self.name, line = %line, "Engine output");
                }
                Ok(None) => {
                    return Err(EngineError::Crashed(
                        "output closed before bestmove".to_string(),
                    ))
                }
                Err(e) => return Err(EngineError::Crashed(format!("read failed: {}", e))),
            }
        };

        // The engine may already be gone; quitting is best effort.
        let _ = stdin.write_all(b"quit\n").await;
        drop(stdin);
        let _ = child.wait().await;

        answer
    }
}

/// Interpret one line of engine output.
///
/// Returns `None` for lines other than `bestmove`.
fn parse_bestmove(line: &str) -> Option<Result<MoveIntent, EngineError>> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "bestmove" {
        return None;
    }
    Some(match parts.next() {
        None | Some("(none)") | Some("0000") => Err(EngineError::NoMove),
        Some(uci) => MoveIntent::from_uci(uci)
            .map_err(|_| EngineError::Malformed(format!("bestmove {}", uci))),
    })
}
