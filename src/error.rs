//! Error type shared by every part of the correction store.
//!
//! Addressing, fingerprint and validation errors are raised before the store
//! is touched. `Persistence` means the correction did not happen.

use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, FeedbackError>;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    /// Square name outside the 64-name vocabulary.
    #[error("invalid square name: {0:?}")]
    InvalidSquare(String),

    /// Grid coordinates outside 0..=7.
    #[error("grid position ({row}, {col}) is outside the 8x8 board")]
    OutOfRange { row: u32, col: u32 },

    #[error("invalid board orientation: {0:?} (expected \"white\" or \"black\")")]
    InvalidOrientation(String),

    #[error("unknown piece label: {0:?}")]
    InvalidLabel(String),

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),

    /// Degenerate image or empty digest.
    #[error("cannot fingerprint image: {0}")]
    Fingerprint(String),

    /// Durable write failed; in-memory state was rolled back.
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load feedback log {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("square image {}: {source}", path.display())]
    Blob {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl FeedbackError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = FeedbackError::OutOfRange { row: 8, col: 0 };
        assert_eq!(err.to_string(), "grid position (8, 0) is outside the 8x8 board");
    }

    #[test]
    fn test_persistence_message_names_path() {
        let err = FeedbackError::persistence("out/log.json", std::io::Error::other("disk full"));
        let msg = err.to_string();
        assert!(msg.contains("out/log.json"));
        assert!(msg.contains("disk full"));
    }
}
