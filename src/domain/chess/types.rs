//! Board vocabulary exchanged with the rules engine.
//!
//! These types are deliberately engine-agnostic: the rules adapter converts
//! them to and from its own representation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// FEN of the standard starting position.
pub const STANDARD_START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Get the opposite color.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// Kind of piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Lowercase UCI promotion letter, for promotable kinds only.
    pub fn promotion_char(self) -> Option<char> {
        match self {
            Self::Knight => Some('n'),
            Self::Bishop => Some('b'),
            Self::Rook => Some('r'),
            Self::Queen => Some('q'),
            Self::Pawn | Self::King => None,
        }
    }

    fn from_promotion_char(c: char) -> Option<Self> {
        match c {
            'n' => Some(Self::Knight),
            'b' => Some(Self::Bishop),
            'r' => Some(Self::Rook),
            'q' => Some(Self::Queen),
            _ => None,
        }
    }
}

/// A square on the board (a1-h8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square(u8);

impl Square {
    /// Create a square from file (0-7) and rank (0-7).
    #[must_use]
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    /// Index 0..64 with a1 = 0, h8 = 63.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Get the file (0-7, a-h).
    #[must_use]
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Get the rank (0-7, 1-8).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl FromStr for Square {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(ValidationError::invalid_format(
                "square",
                "must be 2 characters",
            ));
        }
        let (file, rank) = (bytes[0], bytes[1]);
        if !(b'a'..=b'h').contains(&file) {
            return Err(ValidationError::invalid_format("square", "file must be a-h"));
        }
        if !(b'1'..=b'8').contains(&rank) {
            return Err(ValidationError::invalid_format("square", "rank must be 1-8"));
        }
        Ok(Self((rank - b'1') * 8 + (file - b'a')))
    }
}

impl TryFrom<String> for Square {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

/// A candidate move: origin, destination and optional promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveIntent {
    pub from: Square,
    pub to: Square,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
}

impl MoveIntent {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, kind: PieceKind) -> Self {
        self.promotion = Some(kind);
        self
    }

    /// Parse UCI long algebraic notation (`e2e4`, `e7e8q`).
    pub fn from_uci(uci: &str) -> Result<Self, ValidationError> {
        if !(4..=5).contains(&uci.len()) || !uci.is_ascii() {
            return Err(ValidationError::invalid_format(
                "move",
                "UCI move must be 4-5 characters",
            ));
        }
        let from: Square = uci[0..2].parse()?;
        let to: Square = uci[2..4].parse()?;
        let promotion = match uci[4..].chars().next() {
            None => None,
            Some(c) => Some(PieceKind::from_promotion_char(c).ok_or_else(|| {
                ValidationError::invalid_format("move", "promotion must be q, r, b, or n")
            })?),
        };
        Ok(Self { from, to, promotion })
    }

    /// UCI long algebraic notation.
    pub fn to_uci(&self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(c) = self.promotion.and_then(PieceKind::promotion_char) {
            s.push(c);
        }
        s
    }
}

impl fmt::Display for MoveIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}

/// Opaque, fully-specified board state (FEN).
///
/// The session core never inspects it; only the rules engine does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    pub fn new(notation: impl Into<String>) -> Self {
        Self(notation.into())
    }

    /// The standard chess starting position.
    pub fn standard() -> Self {
        Self(STANDARD_START.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 digest of the notation, used to detect divergence between
    /// the two participants' copies of the game.
    pub fn digest(&self) -> PositionHash {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        PositionHash(hasher.finalize().into())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 digest of a [`Position`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionHash([u8; 32]);

impl PositionHash {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for PositionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for PositionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A legal move as reported by the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMove {
    pub intent: MoveIntent,
    pub san: String,
}

/// Result of successfully applying a move to a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveApplication {
    pub position: Position,
    pub piece_kind: PieceKind,
    pub san: String,
}

/// Terminal classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The side to move is mated.
    Checkmate,
    Stalemate,
    /// Any other rules draw (insufficient material, fifty-move rule).
    Draw,
}
