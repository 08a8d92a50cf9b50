//! Piece classes a square can be labelled with.
//! Twelve pieces plus `Empty`, named on disk the way the recognizer names them
//! (`WHITE_PAWN`, ..., `EMPTY`). Conversion to `shakmaty::Piece` keeps FEN
//! characters in one place.

use serde::{Deserialize, Serialize};
use shakmaty::{Color, Piece, Role};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedbackError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PieceLabel {
    WhitePawn,
    WhiteKnight,
    WhiteBishop,
    WhiteRook,
    WhiteQueen,
    WhiteKing,
    BlackPawn,
    BlackKnight,
    BlackBishop,
    BlackRook,
    BlackQueen,
    BlackKing,
    Empty,
}

impl PieceLabel {
    pub const ALL: [PieceLabel; 13] = [
        PieceLabel::WhitePawn,
        PieceLabel::WhiteKnight,
        PieceLabel::WhiteBishop,
        PieceLabel::WhiteRook,
        PieceLabel::WhiteQueen,
        PieceLabel::WhiteKing,
        PieceLabel::BlackPawn,
        PieceLabel::BlackKnight,
        PieceLabel::BlackBishop,
        PieceLabel::BlackRook,
        PieceLabel::BlackQueen,
        PieceLabel::BlackKing,
        PieceLabel::Empty,
    ];

    /// The chess piece this label stands for, `None` for an empty square.
    pub fn piece(self) -> Option<Piece> {
        let (color, role) = match self {
            PieceLabel::WhitePawn => (Color::White, Role::Pawn),
            PieceLabel::WhiteKnight => (Color::White, Role::Knight),
            PieceLabel::WhiteBishop => (Color::White, Role::Bishop),
            PieceLabel::WhiteRook => (Color::White, Role::Rook),
            PieceLabel::WhiteQueen => (Color::White, Role::Queen),
            PieceLabel::WhiteKing => (Color::White, Role::King),
            PieceLabel::BlackPawn => (Color::Black, Role::Pawn),
            PieceLabel::BlackKnight => (Color::Black, Role::Knight),
            PieceLabel::BlackBishop => (Color::Black, Role::Bishop),
            PieceLabel::BlackRook => (Color::Black, Role::Rook),
            PieceLabel::BlackQueen => (Color::Black, Role::Queen),
            PieceLabel::BlackKing => (Color::Black, Role::King),
            PieceLabel::Empty => return None,
        };
        Some(Piece { color, role })
    }

    pub fn from_piece(piece: Option<Piece>) -> Self {
        let Some(piece) = piece else {
            return PieceLabel::Empty;
        };
        match (piece.color, piece.role) {
            (Color::White, Role::Pawn) => PieceLabel::WhitePawn,
            (Color::White, Role::Knight) => PieceLabel::WhiteKnight,
            (Color::White, Role::Bishop) => PieceLabel::WhiteBishop,
            (Color::White, Role::Rook) => PieceLabel::WhiteRook,
            (Color::White, Role::Queen) => PieceLabel::WhiteQueen,
            (Color::White, Role::King) => PieceLabel::WhiteKing,
            (Color::Black, Role::Pawn) => PieceLabel::BlackPawn,
            (Color::Black, Role::Knight) => PieceLabel::BlackKnight,
            (Color::Black, Role::Bishop) => PieceLabel::BlackBishop,
            (Color::Black, Role::Rook) => PieceLabel::BlackRook,
            (Color::Black, Role::Queen) => PieceLabel::BlackQueen,
            (Color::Black, Role::King) => PieceLabel::BlackKing,
        }
    }

    /// FEN character: uppercase = White (KQRBNP), lowercase = Black, '.' = empty.
    pub fn fen_char(self) -> char {
        self.piece().map_or('.', Piece::char)
    }

    pub fn name(self) -> &'static str {
        match self {
            PieceLabel::WhitePawn => "WHITE_PAWN",
            PieceLabel::WhiteKnight => "WHITE_KNIGHT",
            PieceLabel::WhiteBishop => "WHITE_BISHOP",
            PieceLabel::WhiteRook => "WHITE_ROOK",
            PieceLabel::WhiteQueen => "WHITE_QUEEN",
            PieceLabel::WhiteKing => "WHITE_KING",
            PieceLabel::BlackPawn => "BLACK_PAWN",
            PieceLabel::BlackKnight => "BLACK_KNIGHT",
            PieceLabel::BlackBishop => "BLACK_BISHOP",
            PieceLabel::BlackRook => "BLACK_ROOK",
            PieceLabel::BlackQueen => "BLACK_QUEEN",
            PieceLabel::BlackKing => "BLACK_KING",
            PieceLabel::Empty => "EMPTY",
        }
    }
}

impl fmt::Display for PieceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Accepts the on-disk name (`WHITE_KNIGHT`, case-insensitive) or a FEN
/// character (`N`, `n`, `.`).
impl FromStr for PieceLabel {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(label) = PieceLabel::ALL
            .iter()
            .copied()
            .find(|label| label.name().eq_ignore_ascii_case(trimmed))
        {
            return Ok(label);
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some('.'), None) => Ok(PieceLabel::Empty),
            (Some(c), None) => Piece::from_char(c)
                .map(|piece| PieceLabel::from_piece(Some(piece)))
                .ok_or_else(|| FeedbackError::InvalidLabel(s.to_string())),
            _ => Err(FeedbackError::InvalidLabel(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fen_chars() {
        assert_eq!(PieceLabel::WhiteKnight.fen_char(), 'N');
        assert_eq!(PieceLabel::BlackQueen.fen_char(), 'q');
        assert_eq!(PieceLabel::Empty.fen_char(), '.');
    }

    #[test]
    fn test_piece_conversion_covers_every_label() {
        for label in PieceLabel::ALL {
            assert_eq!(PieceLabel::from_piece(label.piece()), label);
        }
    }

    #[test]
    fn test_parse_names_and_chars() {
        assert_eq!("WHITE_BISHOP".parse::<PieceLabel>().unwrap(), PieceLabel::WhiteBishop);
        assert_eq!("black_king".parse::<PieceLabel>().unwrap(), PieceLabel::BlackKing);
        assert_eq!("p".parse::<PieceLabel>().unwrap(), PieceLabel::BlackPawn);
        assert_eq!(".".parse::<PieceLabel>().unwrap(), PieceLabel::Empty);
        assert!(matches!(
            "WHITE_DRAGON".parse::<PieceLabel>(),
            Err(FeedbackError::InvalidLabel(_))
        ));
        assert!("x".parse::<PieceLabel>().is_err());
    }

    #[test]
    fn test_serde_uses_recognizer_names() {
        let json = serde_json::to_string(&PieceLabel::WhiteKnight).unwrap();
        assert_eq!(json, "\"WHITE_KNIGHT\"");
        let back: PieceLabel = serde_json::from_str("\"EMPTY\"").unwrap();
        assert_eq!(back, PieceLabel::Empty);
    }
}
