//! The correction feedback store.
//!
//! An append-only log of [`FeedbackRecord`]s plus an index from
//! [`ContentKey`] to the position of the one active record for that key.
//! A new correction for a key deactivates the previous record instead of
//! replacing it, so the log keeps the full history while the training set
//! sees exactly one label per physical square of each source image.
//!
//! Supersede, append, persist and index update happen under a single lock.
//! Readers take the same lock, so they never see a key with zero or two
//! active records. If the durable write fails the in-memory change is undone
//! before the lock is released.

use chrono::Utc;
use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{FeedbackError, Result};
use crate::fingerprint::{BoardImage, Fingerprint};
use crate::persist::{self, BlobStore, JsonLog, RecordLog};
use crate::piece::PieceLabel;
use crate::record::{ContentKey, FeedbackRecord, ImageRef, NewRecord};
use crate::square::{self, Orientation, SquareName};
use crate::stats::{self, SessionSummary, Statistics};

/// One correction as the store receives it: a canonical square name and a
/// stored square image, already resolved by the caller.
#[derive(Clone, Debug)]
pub struct Correction {
    pub square_name: String,
    pub original_label: PieceLabel,
    pub confidence: f64,
    pub corrected_label: PieceLabel,
    pub image_ref: ImageRef,
    pub fingerprint: Fingerprint,
    pub orientation: Orientation,
    pub session_id: String,
}

/// One correction as the board UI sees it: the clicked grid cell, the
/// orientation on screen, and the recognizer's guess next to the user's answer.
#[derive(Clone, Copy, Debug)]
pub struct CellCorrection {
    pub row: u32,
    pub col: u32,
    pub orientation: Orientation,
    pub predicted: PieceLabel,
    pub confidence: f64,
    pub corrected: PieceLabel,
}

#[derive(Debug, Default)]
struct LogState {
    records: Vec<FeedbackRecord>,
    active: HashMap<ContentKey, usize>,
}

impl LogState {
    /// Rebuilds the active index from a loaded log. Where an older log has
    /// several active records for one key, the most recently appended wins.
    fn from_records(mut records: Vec<FeedbackRecord>) -> Self {
        let mut active: HashMap<ContentKey, usize> = HashMap::new();
        let mut demoted = 0usize;
        for idx in 0..records.len() {
            if !records[idx].is_active() {
                continue;
            }
            let Some(key) = records[idx].content_key().cloned() else {
                continue;
            };
            if let Some(prev) = active.insert(key, idx) {
                records[prev].set_active(false);
                demoted += 1;
            }
        }
        if demoted > 0 {
            tracing::warn!(demoted, "log had duplicate active records; kept the latest per key");
        }
        Self { records, active }
    }
}

pub struct FeedbackStore {
    state: Mutex<LogState>,
    log: Box<dyn RecordLog>,
    blobs: BlobStore,
    session_id: String,
}

impl std::fmt::Debug for FeedbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackStore")
            .field("log", &self.log.location())
            .field("blobs", &self.blobs.dir())
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl FeedbackStore {
    /// Opens the JSON log and blob directory named by `config`.
    /// A fresh session id is generated when `session_id` is `None`.
    pub fn open(config: &Config, session_id: Option<String>) -> Result<Self> {
        let blobs = BlobStore::new(config.images_dir(), config.log_dir());
        Self::with_log(JsonLog::new(&config.feedback_file), blobs, session_id)
    }

    pub fn with_log(
        log: impl RecordLog + 'static,
        blobs: BlobStore,
        session_id: Option<String>,
    ) -> Result<Self> {
        let records = log.load()?;
        let state = LogState::from_records(records);
        let session_id = session_id.unwrap_or_else(new_session_id);
        tracing::info!(
            path = %log.location().display(),
            records = state.records.len(),
            active = state.active.len(),
            session = %session_id,
            "feedback store opened"
        );
        Ok(Self {
            state: Mutex::new(state),
            log: Box::new(log),
            blobs,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Appends a correction, superseding the active record for the same
    /// content key. Nothing changes unless the log write succeeds.
    pub fn add_correction(&self, correction: Correction) -> Result<FeedbackRecord> {
        let square: SquareName = correction.square_name.parse()?;
        check_confidence(correction.confidence)?;
        let key = ContentKey::new(&correction.fingerprint, square);

        let new = NewRecord {
            square_name: square,
            original_label: correction.original_label,
            original_confidence: correction.confidence,
            corrected_label: correction.corrected_label,
            image_ref: correction.image_ref,
            fingerprint: correction.fingerprint,
            orientation: correction.orientation,
            session_id: correction.session_id,
        };
        let mut state = self.state.lock();
        // stamped under the lock and never earlier than the last record
        let now = Utc::now();
        let created_at = state.records.last().map_or(now, |last| last.created_at().max(now));
        let record = FeedbackRecord::create(new, created_at);

        let superseded = state.active.get(&key).copied();
        if let Some(prev) = superseded {
            state.records[prev].set_active(false);
        }
        state.records.push(record.clone());

        if let Err(e) = self.log.save(&state.records) {
            state.records.pop();
            if let Some(prev) = superseded {
                state.records[prev].set_active(true);
            }
            tracing::warn!(key = %key, error = %e, "correction not persisted; rolled back");
            return Err(e);
        }

        let idx = state.records.len() - 1;
        state.active.insert(key.clone(), idx);
        drop(state);

        tracing::info!(
            square = %square,
            key = %key,
            from = %record.original_label().map_or("-", PieceLabel::name),
            to = %record.corrected_label(),
            superseded = superseded.is_some(),
            session = %record.session_id(),
            "correction recorded"
        );
        Ok(record)
    }

    /// Producer entry point: addresses the clicked cell, stores the square
    /// image (cropped from `board` unless given) and records the correction
    /// under this store's session.
    pub fn record_correction(
        &self,
        board: &BoardImage,
        cell: CellCorrection,
        square_image: Option<&DynamicImage>,
    ) -> Result<FeedbackRecord> {
        let square = square::square_name(cell.row, cell.col, cell.orientation)?;
        check_confidence(cell.confidence)?;

        let cropped;
        let square_image = match square_image {
            Some(image) => image,
            None => {
                cropped = board.crop_cell(cell.row, cell.col)?;
                &cropped
            }
        };
        let image_ref = self.blobs.save(square, square_image)?;

        let result = self.add_correction(Correction {
            square_name: square.to_string(),
            original_label: cell.predicted,
            confidence: cell.confidence,
            corrected_label: cell.corrected,
            image_ref: image_ref.clone(),
            fingerprint: board.fingerprint().clone(),
            orientation: cell.orientation,
            session_id: self.session_id.clone(),
        });
        if result.is_err() {
            self.blobs.discard(&image_ref);
        }
        result
    }

    /// `(image, label)` pairs for a trainer. With `active_only`, one pair per
    /// content key, labelled by its active record; otherwise every record.
    /// Records without a stored image are skipped.
    pub fn get_training_set(&self, active_only: bool) -> Vec<(ImageRef, PieceLabel)> {
        let state = self.state.lock();
        state
            .records
            .iter()
            .filter(|r| !active_only || (r.is_active() && r.content_key().is_some()))
            .filter_map(|r| r.image_ref().map(|img| (img.clone(), r.corrected_label())))
            .collect()
    }

    /// Decodes the images of the deduplicated training set.
    pub fn load_training_images(&self) -> Result<Vec<(DynamicImage, PieceLabel)>> {
        self.get_training_set(true)
            .into_iter()
            .map(|(image_ref, label)| Ok((self.blobs.open(&image_ref)?, label)))
            .collect()
    }

    pub fn get_statistics(&self, active_only: bool) -> Statistics {
        Statistics::collect(&self.state.lock().records, active_only)
    }

    pub fn get_by_session(&self, session_id: &str) -> Vec<FeedbackRecord> {
        self.filtered(|r| r.session_id() == session_id)
    }

    /// Active records whose corrected label is `label`.
    pub fn get_by_label(&self, label: PieceLabel) -> Vec<FeedbackRecord> {
        self.filtered(|r| r.is_active() && r.corrected_label() == label)
    }

    /// Active records where the user disagreed with the recognizer.
    pub fn get_misclassified(&self) -> Vec<FeedbackRecord> {
        self.filtered(|r| r.is_active() && r.is_misclassified())
    }

    pub fn session_summary(&self) -> BTreeMap<String, SessionSummary> {
        stats::session_summary(&self.state.lock().records)
    }

    pub fn active_record(&self, key: &ContentKey) -> Option<FeedbackRecord> {
        let state = self.state.lock();
        state.active.get(key).map(|&idx| state.records[idx].clone())
    }

    /// Snapshot of the full log, in append order.
    pub fn records(&self) -> Vec<FeedbackRecord> {
        self.state.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the full log, in the on-disk format, to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = self.state.lock();
        persist::write_json_atomic(path, &state.records)?;
        tracing::info!(path = %path.display(), records = state.records.len(), "feedback exported");
        Ok(())
    }

    /// Irreversibly deletes the log, every referenced square image and all
    /// in-memory state. Only a failure to remove the log is an error; square
    /// images that cannot be deleted are logged and left behind.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.log.clear()?;
        let old = std::mem::take(&mut *state);
        let discarded = old.records.len();
        let kept = self.blobs.clear(old.records.iter().filter_map(FeedbackRecord::image_ref));
        tracing::info!(discarded, blobs_left = kept, "feedback store cleared");
        Ok(())
    }

    fn filtered(&self, keep: impl Fn(&FeedbackRecord) -> bool) -> Vec<FeedbackRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(FeedbackError::InvalidConfidence(confidence))
    }
}

/// `session_<UTC timestamp>_<8 hex chars>`.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory log; fails every save while `fail` is set.
    #[derive(Default)]
    struct MemoryLog {
        fail: Arc<AtomicBool>,
    }

    impl RecordLog for MemoryLog {
        fn load(&self) -> Result<Vec<FeedbackRecord>> {
            Ok(Vec::new())
        }

        fn save(&self, _records: &[FeedbackRecord]) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                let e = std::io::Error::other("disk full");
                return Err(FeedbackError::persistence("memory", e));
            }
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            Ok(())
        }

        fn location(&self) -> &Path {
            Path::new("memory")
        }
    }

    fn memory_store() -> FeedbackStore {
        let blobs = BlobStore::new("unused/images", "unused");
        FeedbackStore::with_log(MemoryLog::default(), blobs, Some("s1".into())).unwrap()
    }

    fn correction(square: &str, fingerprint: &str, label: PieceLabel) -> Correction {
        Correction {
            square_name: square.to_string(),
            original_label: PieceLabel::WhitePawn,
            confidence: 0.6,
            corrected_label: label,
            image_ref: ImageRef::new(format!("training_images/{square}.png")),
            fingerprint: Fingerprint::new(fingerprint).unwrap(),
            orientation: Orientation::White,
            session_id: "s1".to_string(),
        }
    }

    #[test]
    fn test_supersede_keeps_history() {
        let store = memory_store();
        store.add_correction(correction("e4", "ABC123", PieceLabel::WhiteKnight)).unwrap();
        store.add_correction(correction("e4", "ABC123", PieceLabel::WhiteBishop)).unwrap();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_active());
        assert!(records[1].is_active());

        let key = records[1].content_key().unwrap().clone();
        let active = store.active_record(&key).unwrap();
        assert_eq!(active.corrected_label(), PieceLabel::WhiteBishop);
    }

    #[test]
    fn test_invalid_input_rejected_before_mutation() {
        let store = memory_store();
        let err = store.add_correction(correction("z9", "ABC123", PieceLabel::Empty)).unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidSquare(_)));

        let mut bad = correction("e4", "ABC123", PieceLabel::Empty);
        bad.confidence = 1.5;
        assert!(matches!(store.add_correction(bad), Err(FeedbackError::InvalidConfidence(_))));

        let mut nan = correction("e4", "ABC123", PieceLabel::Empty);
        nan.confidence = f64::NAN;
        assert!(store.add_correction(nan).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let fail = Arc::new(AtomicBool::new(false));
        let log = MemoryLog { fail: Arc::clone(&fail) };
        let store = FeedbackStore::with_log(log, BlobStore::new("x", "."), None).unwrap();
        let first = store
            .add_correction(correction("e4", "ABC123", PieceLabel::WhiteKnight))
            .unwrap();
        let key = first.content_key().unwrap().clone();

        fail.store(true, Ordering::SeqCst);
        let err = store.add_correction(correction("e4", "ABC123", PieceLabel::WhiteBishop));
        assert!(matches!(err, Err(FeedbackError::Persistence { .. })));
        assert_eq!(store.len(), 1);
        assert!(store.records()[0].is_active());
        assert_eq!(store.active_record(&key).unwrap(), first);

        fail.store(false, Ordering::SeqCst);
        store.add_correction(correction("e4", "ABC123", PieceLabel::WhiteBishop)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_record(&key).unwrap().corrected_label(), PieceLabel::WhiteBishop);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert!(a.starts_with("session_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_misclassified_and_by_label() {
        let store = memory_store();
        let mut confirmed = correction("a1", "F1", PieceLabel::WhiteRook);
        confirmed.original_label = PieceLabel::WhiteRook;
        store.add_correction(confirmed).unwrap();
        store.add_correction(correction("e4", "F1", PieceLabel::WhiteKnight)).unwrap();
        store.add_correction(correction("d4", "F1", PieceLabel::WhiteKnight)).unwrap();

        assert_eq!(store.get_misclassified().len(), 2);
        assert_eq!(store.get_by_label(PieceLabel::WhiteKnight).len(), 2);
        assert_eq!(store.get_by_label(PieceLabel::WhiteRook).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_one_active_per_key(
            ops in prop::collection::vec((0usize..3, 0usize..4, 0usize..13), 1..40)
        ) {
            let store = memory_store();
            let squares = ["e4", "d4", "a1", "h8"];
            let images = ["img0", "img1", "img2"];
            let mut seen = HashSet::new();

            for (n, &(img, sq, label)) in ops.iter().enumerate() {
                store
                    .add_correction(correction(squares[sq], images[img], PieceLabel::ALL[label]))
                    .unwrap();
                seen.insert((img, sq));

                let records = store.records();
                prop_assert_eq!(records.len(), n + 1);
                let mut active_keys = HashSet::new();
                for r in records.iter().filter(|r| r.is_active()) {
                    prop_assert!(active_keys.insert(r.content_key().unwrap().clone()));
                }
                prop_assert_eq!(active_keys.len(), seen.len());
                prop_assert_eq!(store.get_training_set(true).len(), seen.len());
            }
        }
    }
}
