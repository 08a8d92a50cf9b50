//! Correction feedback store for chess piece recognition.
//!
//! Turns user corrections of misrecognized squares into a deduplicated
//! `(square image, label)` training set while keeping every correction in an
//! append-only audit log.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod persist;
pub mod piece;
pub mod record;
pub mod square;
pub mod stats;
pub mod store;

pub use config::Config;
pub use error::{FeedbackError, Result};
pub use fingerprint::{BoardImage, Fingerprint, ImageFingerprinter};
pub use persist::{BlobStore, JsonLog, RecordLog};
pub use piece::PieceLabel;
pub use record::{ContentKey, FeedbackRecord, ImageRef, LEGACY_SESSION};
pub use square::{Orientation, SquareName, square_name};
pub use stats::{SessionSummary, Statistics};
pub use store::{CellCorrection, Correction, FeedbackStore};
