//! Chess vocabulary shared by the session core and the rules engine port.

mod types;

pub use types::{
    Color, LegalMove, MoveApplication, MoveIntent, PieceKind, Position, PositionHash, Square,
    Termination, STANDARD_START,
};
