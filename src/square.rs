//! Grid position to canonical square name.
//!
//! The board widget hands us a (row, col) cell of the 8x8 grid it displays
//! plus the orientation it was showing. Row 0 is the top of the screen.
//!
//! - `White` (white at the bottom): top-left is a8, so `file = col`, `rank = 8 - row`.
//! - `Black` (board rotated 180 degrees): top-left is h1, so `file = 7 - col`, `rank = row + 1`.
//!
//! Both mappings are bijections and agree on the physical square:
//! `square_name(r, c, White) == square_name(7 - r, 7 - c, Black)`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shakmaty::{File, Rank, Square};
use std::fmt;
use std::str::FromStr;

use crate::error::{FeedbackError, Result};

/// Which side of the board was at the bottom when the user clicked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    White,
    Black,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::White => write!(f, "white"),
            Orientation::Black => write!(f, "black"),
        }
    }
}

impl FromStr for Orientation {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("white") {
            Ok(Orientation::White)
        } else if s.eq_ignore_ascii_case("black") {
            Ok(Orientation::Black)
        } else {
            Err(FeedbackError::InvalidOrientation(s.to_string()))
        }
    }
}

/// One of the 64 canonical square names, `a1` through `h8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SquareName(Square);

impl fmt::Display for SquareName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SquareName {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Square>()
            .map(SquareName)
            .map_err(|_| FeedbackError::InvalidSquare(s.to_string()))
    }
}

impl Serialize for SquareName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SquareName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Maps a displayed grid cell to its canonical square name.
pub fn square_name(row: u32, col: u32, orientation: Orientation) -> Result<SquareName> {
    if row > 7 || col > 7 {
        return Err(FeedbackError::OutOfRange { row, col });
    }
    let (file, rank) = match orientation {
        Orientation::White => (col, 7 - row),
        Orientation::Black => (7 - col, row),
    };
    Ok(SquareName(Square::from_coords(File::new(file), Rank::new(rank))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn name(row: u32, col: u32, orientation: Orientation) -> String {
        square_name(row, col, orientation).unwrap().to_string()
    }

    #[test]
    fn test_white_corners() {
        assert_eq!(name(0, 0, Orientation::White), "a8");
        assert_eq!(name(0, 7, Orientation::White), "h8");
        assert_eq!(name(7, 0, Orientation::White), "a1");
        assert_eq!(name(7, 7, Orientation::White), "h1");
        assert_eq!(name(4, 4, Orientation::White), "e4");
    }

    #[test]
    fn test_black_corners() {
        assert_eq!(name(0, 0, Orientation::Black), "h1");
        assert_eq!(name(0, 7, Orientation::Black), "a1");
        assert_eq!(name(7, 0, Orientation::Black), "h8");
        assert_eq!(name(7, 7, Orientation::Black), "a8");
        assert_eq!(name(3, 3, Orientation::Black), "e4");
    }

    #[test]
    fn test_each_orientation_is_a_bijection() {
        for orientation in [Orientation::White, Orientation::Black] {
            let names: HashSet<String> = (0..8)
                .flat_map(|row| (0..8).map(move |col| (row, col)))
                .map(|(row, col)| name(row, col, orientation))
                .collect();
            assert_eq!(names.len(), 64, "{orientation} mapping is not one-to-one");
        }
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            square_name(8, 0, Orientation::White),
            Err(FeedbackError::OutOfRange { row: 8, col: 0 })
        ));
        assert!(square_name(0, 8, Orientation::Black).is_err());
    }

    #[test]
    fn test_orientation_strings() {
        assert_eq!("white".parse::<Orientation>().unwrap(), Orientation::White);
        assert_eq!("Black".parse::<Orientation>().unwrap(), Orientation::Black);
        assert!(matches!(
            "sideways".parse::<Orientation>(),
            Err(FeedbackError::InvalidOrientation(_))
        ));
        assert!("".parse::<Orientation>().is_err());
    }

    #[test]
    fn test_square_name_parse() {
        assert_eq!("e4".parse::<SquareName>().unwrap().to_string(), "e4");
        for bad in ["", "i1", "a9", "e44", "E"] {
            assert!(
                matches!(bad.parse::<SquareName>(), Err(FeedbackError::InvalidSquare(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_square_name_serde() {
        let sq: SquareName = serde_json::from_str("\"g7\"").unwrap();
        assert_eq!(serde_json::to_string(&sq).unwrap(), "\"g7\"");
        assert!(serde_json::from_str::<SquareName>("\"z0\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_rotated_grid_names_same_square(row in 0u32..8, col in 0u32..8) {
            prop_assert_eq!(
                square_name(row, col, Orientation::White).unwrap(),
                square_name(7 - row, 7 - col, Orientation::Black).unwrap()
            );
        }
    }
}
