//! Rules engine backed by shakmaty.
//!
//! Positions are FEN strings. Every call parses its input afresh, which
//! keeps the adapter stateless and safe to share across sessions.

use shakmaty::{
    fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, EnPassantMode, Move, Position as _,
    Role,
};

use crate::domain::chess::{
    Color, LegalMove, MoveApplication, MoveIntent, PieceKind, Position, Square,
};
use crate::ports::{RulesEngine, RulesError};

/// Halfmove count at which the fifty-move rule ends the game.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Standard chess rules over shakmaty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    pub fn new() -> Self {
        Self
    }

    fn parse(position: &Position) -> Result<Chess, RulesError> {
        let fen: Fen = position
            .as_str()
            .parse()
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))
    }

    fn render(chess: Chess) -> Position {
        Position::new(Fen::from_position(chess, EnPassantMode::Legal).to_string())
    }

    fn resolve(chess: &Chess, mv: &MoveIntent) -> Result<Move, RulesError> {
        let uci = UciMove::Normal {
            from: to_engine_square(mv.from),
            to: to_engine_square(mv.to),
            promotion: mv.promotion.map(to_role),
        };
        uci.to_move(chess)
            .map_err(|_| RulesError::IllegalMove(*mv))
    }
}

impl RulesEngine for ShakmatyRules {
    fn legal_moves(
        &self,
        position: &Position,
        from: Option<Square>,
    ) -> Result<Vec<LegalMove>, RulesError> {
        let chess = Self::parse(position)?;
        let origin = from.map(to_engine_square);
        let moves = chess
            .legal_moves()
            .iter()
            .filter(|m| origin.is_none() || m.from() == origin)
            // shakmaty encodes castling as king-takes-rook; report the
            // king's destination instead
            .filter_map(|m| match m.to_uci(CastlingMode::Standard) {
                UciMove::Normal {
                    from,
                    to,
                    promotion,
                } => Some(LegalMove {
                    intent: MoveIntent {
                        from: from_engine_square(from),
                        to: from_engine_square(to),
                        promotion: promotion.map(from_role),
                    },
                    san: San::from_move(&chess, m).to_string(),
                }),
                _ => None,
            })
            .collect();
        Ok(moves)
    }

    fn apply_move(
        &self,
        position: &Position,
        mv: &MoveIntent,
    ) -> Result<MoveApplication, RulesError> {
        let chess = Self::parse(position)?;
        let m = Self::resolve(&chess, mv)?;
        if !chess.is_legal(&m) {
            return Err(RulesError::IllegalMove(*mv));
        }

        let san = San::from_move(&chess, &m).to_string();
        let piece_kind = from_role(m.role());
        let next = chess
            .play(&m)
            .map_err(|_| RulesError::IllegalMove(*mv))?;

        Ok(MoveApplication {
            position: Self::render(next),
            piece_kind,
            san,
        })
    }

    fn turn_color(&self, position: &Position) -> Result<Color, RulesError> {
        Ok(from_color(Self::parse(position)?.turn()))
    }

    fn is_check(&self, position: &Position) -> Result<bool, RulesError> {
        Ok(Self::parse(position)?.is_check())
    }

    fn is_checkmate(&self, position: &Position) -> Result<bool, RulesError> {
        Ok(Self::parse(position)?.is_checkmate())
    }

    fn is_stalemate(&self, position: &Position) -> Result<bool, RulesError> {
        Ok(Self::parse(position)?.is_stalemate())
    }

    fn is_draw(&self, position: &Position) -> Result<bool, RulesError> {
        let chess = Self::parse(position)?;
        Ok(chess.is_insufficient_material() || chess.halfmoves() >= FIFTY_MOVE_HALFMOVES)
    }
}

fn to_engine_square(square: Square) -> shakmaty::Square {
    shakmaty::Square::new(u32::from(square.index()))
}

fn from_engine_square(square: shakmaty::Square) -> Square {
    let index = square as u8;
    Square::new(index % 8, index / 8).unwrap_or_else(|| unreachable!("shakmaty squares are 0..64"))
}

fn from_color(color: shakmaty::Color) -> Color {
    match color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}

fn from_role(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

fn to_role(kind: PieceKind) -> Role {
    match kind {
        PieceKind::Pawn => Role::Pawn,
        PieceKind::Knight => Role::Knight,
        PieceKind::Bishop => Role::Bishop,
        PieceKind::Rook => Role::Rook,
        PieceKind::Queen => Role::Queen,
        PieceKind::King => Role::King,
    }
}
