//! RulesEngine port - Pure board-legality functions.
//!
//! The session core never encodes chess rules itself. Everything it needs
//! to know about a position comes through this trait: who is to move,
//! whether a candidate move is legal and what it produces, and whether the
//! game is over.
//!
//! Implementations must be pure: the same inputs always yield the same
//! outputs, so both participants replaying the same move log reach the
//! same position.

use thiserror::Error;

use crate::domain::chess::{
    Color, LegalMove, MoveApplication, MoveIntent, Position, Square, Termination,
};

/// Errors reported by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// The position notation could not be parsed.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The move is not legal in the given position.
    #[error("illegal move {0}")]
    IllegalMove(MoveIntent),
}

/// Port for board legality.
pub trait RulesEngine: Send + Sync {
    /// Position every new session starts from.
    fn initial_position(&self) -> Position {
        Position::standard()
    }

    /// All legal moves, optionally restricted to those leaving `from`.
    fn legal_moves(
        &self,
        position: &Position,
        from: Option<Square>,
    ) -> Result<Vec<LegalMove>, RulesError>;

    /// Apply a move, returning the resulting position or rejecting it.
    fn apply_move(
        &self,
        position: &Position,
        mv: &MoveIntent,
    ) -> Result<MoveApplication, RulesError>;

    /// Color to move in the position.
    fn turn_color(&self, position: &Position) -> Result<Color, RulesError>;

    fn is_check(&self, position: &Position) -> Result<bool, RulesError>;

    fn is_checkmate(&self, position: &Position) -> Result<bool, RulesError>;

    fn is_stalemate(&self, position: &Position) -> Result<bool, RulesError>;

    fn is_draw(&self, position: &Position) -> Result<bool, RulesError>;

    /// Terminal classification, or `None` while the game goes on.
    fn classify(&self, position: &Position) -> Result<Option<Termination>, RulesError> {
        if self.is_checkmate(position)? {
            Ok(Some(Termination::Checkmate))
        } else if self.is_stalemate(position)? {
            Ok(Some(Termination::Stalemate))
        } else if self.is_draw(position)? {
            Ok(Some(Termination::Draw))
        } else {
            Ok(None)
        }
    }

    /// Replay a move log from `start`, failing on the first rejected move.
    fn replay(&self, start: &Position, moves: &[MoveIntent]) -> Result<Position, RulesError> {
        moves.iter().try_fold(start.clone(), |position, mv| {
            self.apply_move(&position, mv).map(|applied| applied.position)
        })
    }
}
