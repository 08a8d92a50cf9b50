//! A single correction event and its deduplication key.
//!
//! Records are written once and never edited; the only transition is the
//! store flipping `is_active` from true to false when a newer correction for
//! the same [`ContentKey`] arrives.
//!
//! Older logs predate sessions, image hashes and supersession. Loading goes
//! through [`StoredRecord`], which fills those gaps in one place:
//! `is_active` defaults to true, `session_id` to [`LEGACY_SESSION`], and the
//! key is rebuilt from the image hash when possible. A record whose key
//! cannot be rebuilt stays in the log but never takes part in deduplication.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fingerprint::Fingerprint;
use crate::piece::PieceLabel;
use crate::square::{Orientation, SquareName};

/// Session id given to records written before sessions existed.
pub const LEGACY_SESSION: &str = "legacy";

/// `fingerprint + "_" + square_name`: one physical square of one source image.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn new(fingerprint: &Fingerprint, square: SquareName) -> Self {
        Self(format!("{fingerprint}_{square}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a stored square image, relative to the feedback log's directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredRecord")]
pub struct FeedbackRecord {
    square_name: SquareName,
    original_prediction: Option<PieceLabel>,
    original_confidence: f64,
    user_correction: PieceLabel,
    timestamp: DateTime<Utc>,
    square_image_path: Option<ImageRef>,
    board_orientation: Option<Orientation>,
    session_id: String,
    image_hash: Option<Fingerprint>,
    unique_key: Option<ContentKey>,
    is_active: bool,
}

/// Everything the store needs to create a record.
#[derive(Clone, Debug)]
pub(crate) struct NewRecord {
    pub square_name: SquareName,
    pub original_label: PieceLabel,
    pub original_confidence: f64,
    pub corrected_label: PieceLabel,
    pub image_ref: ImageRef,
    pub fingerprint: Fingerprint,
    pub orientation: Orientation,
    pub session_id: String,
}

impl FeedbackRecord {
    pub(crate) fn create(new: NewRecord, created_at: DateTime<Utc>) -> Self {
        let key = ContentKey::new(&new.fingerprint, new.square_name);
        Self {
            square_name: new.square_name,
            original_prediction: Some(new.original_label),
            original_confidence: new.original_confidence,
            user_correction: new.corrected_label,
            timestamp: created_at,
            square_image_path: Some(new.image_ref),
            board_orientation: Some(new.orientation),
            session_id: new.session_id,
            image_hash: Some(new.fingerprint),
            unique_key: Some(key),
            is_active: true,
        }
    }

    pub fn square_name(&self) -> SquareName {
        self.square_name
    }

    /// `None` only for legacy records where the recognizer offered no label.
    pub fn original_label(&self) -> Option<PieceLabel> {
        self.original_prediction
    }

    pub fn original_confidence(&self) -> f64 {
        self.original_confidence
    }

    pub fn corrected_label(&self) -> PieceLabel {
        self.user_correction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn image_ref(&self) -> Option<&ImageRef> {
        self.square_image_path.as_ref()
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.board_orientation
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.image_hash.as_ref()
    }

    /// `None` when the record carries no usable image hash.
    pub fn content_key(&self) -> Option<&ContentKey> {
        self.unique_key.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_misclassified(&self) -> bool {
        self.original_prediction != Some(self.user_correction)
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }
}

/// On-disk shape, tolerant of every older revision of the log.
#[derive(Deserialize)]
struct StoredRecord {
    square_name: SquareName,
    #[serde(default)]
    original_prediction: Option<PieceLabel>,
    #[serde(default)]
    original_confidence: f64,
    user_correction: PieceLabel,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    square_image_path: Option<ImageRef>,
    #[serde(default)]
    board_orientation: Option<Orientation>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    image_hash: Option<String>,
    #[serde(default)]
    unique_key: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<StoredRecord> for FeedbackRecord {
    fn from(stored: StoredRecord) -> Self {
        let square = stored.square_name;
        let fingerprint = stored
            .image_hash
            .and_then(|hash| Fingerprint::new(hash).ok())
            .or_else(|| {
                // hash missing but the key survived: "<hash>_<square>"
                let suffix = format!("_{square}");
                stored
                    .unique_key
                    .as_deref()
                    .and_then(|key| key.strip_suffix(suffix.as_str()))
                    .and_then(|hash| Fingerprint::new(hash).ok())
            });
        let unique_key = fingerprint.as_ref().map(|fp| ContentKey::new(fp, square));

        let timestamp = stored
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_default();

        Self {
            square_name: square,
            original_prediction: stored.original_prediction,
            original_confidence: stored.original_confidence,
            user_correction: stored.user_correction,
            timestamp,
            square_image_path: stored.square_image_path,
            board_orientation: stored.board_orientation,
            session_id: stored
                .session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| LEGACY_SESSION.to_string()),
            image_hash: fingerprint,
            unique_key,
            is_active: stored.is_active,
        }
    }
}

/// RFC 3339, or the naive local ISO form older logs were written with (read as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
