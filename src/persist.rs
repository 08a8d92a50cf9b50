//! Durable storage for the feedback log and the square images it points to.
//!
//! The log is a pretty-printed JSON array rewritten in full on every commit:
//! write a sibling temp file, fsync it, rename over the log. A reader of the
//! file sees the old log or the new one, never half of each.

use image::{DynamicImage, ImageFormat};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{FeedbackError, Result};
use crate::record::{FeedbackRecord, ImageRef};
use crate::square::SquareName;

/// Where committed records live. The store calls `save` with the full log
/// inside its critical section and only commits if it returns `Ok`.
pub trait RecordLog: Send + Sync {
    /// Every record in log order; an absent or empty log is `Ok(vec![])`.
    fn load(&self) -> Result<Vec<FeedbackRecord>>;

    fn save(&self, records: &[FeedbackRecord]) -> Result<()>;

    /// Removes the log entirely.
    fn clear(&self) -> Result<()>;

    fn location(&self) -> &Path;
}

#[derive(Clone, Debug)]
pub struct JsonLog {
    path: PathBuf,
}

impl JsonLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordLog for JsonLog {
    fn load(&self) -> Result<Vec<FeedbackRecord>> {
        let load_err = |source: io::Error| FeedbackError::Load {
            path: self.path.clone(),
            source,
        };
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no existing feedback log");
                return Ok(Vec::new());
            }
            Err(e) => return Err(load_err(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(path = %self.path.display(), "feedback log is empty");
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| load_err(e.into()))
    }

    fn save(&self, records: &[FeedbackRecord]) -> Result<()> {
        write_json_atomic(&self.path, records)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FeedbackError::persistence(&self.path, e)),
        }
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Serializes `records` to `path` through a temp file and rename.
pub(crate) fn write_json_atomic(path: &Path, records: &[FeedbackRecord]) -> Result<()> {
    let fail = |e: io::Error| FeedbackError::persistence(path, e);

    let json = serde_json::to_vec_pretty(records).map_err(|e| fail(e.into()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fail)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(fail(e));
    }
    Ok(())
}

/// Square images, one PNG per record, kept for the lifetime of the log.
#[derive(Clone, Debug)]
pub struct BlobStore {
    dir: PathBuf,
    base: PathBuf,
}

impl BlobStore {
    /// `base` is the directory image refs are relative to (the log's directory).
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `image` as `<square>_<timestamp>.png`, suffixing a counter if the
    /// name is taken. The file is created exclusively, so concurrent writers
    /// never share a name.
    pub fn save(&self, square: SquareName, image: &DynamicImage) -> Result<ImageRef> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%6f");
        fs::create_dir_all(&self.dir).map_err(|e| FeedbackError::persistence(&self.dir, e))?;

        let mut attempt = 0u32;
        let (path, file) = loop {
            let name = match attempt {
                0 => format!("{square}_{stamp}.png"),
                n => format!("{square}_{stamp}_{n}.png"),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(FeedbackError::persistence(&path, e)),
            }
        };

        let mut writer = BufWriter::new(file);
        let encoded = image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|source| FeedbackError::Blob {
                path: path.clone(),
                source,
            })
            .and_then(|()| {
                let file = writer
                    .into_inner()
                    .map_err(|e| FeedbackError::persistence(&path, e.into_error()))?;
                file.sync_all().map_err(|e| FeedbackError::persistence(&path, e))
            });
        if let Err(e) = encoded {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        Ok(self.image_ref(&path))
    }

    pub fn resolve(&self, image_ref: &ImageRef) -> PathBuf {
        self.base.join(image_ref.as_str())
    }

    pub fn open(&self, image_ref: &ImageRef) -> Result<DynamicImage> {
        let path = self.resolve(image_ref);
        image::open(&path).map_err(|source| FeedbackError::Blob { path, source })
    }

    /// Best-effort delete; used for blobs whose record never committed.
    pub fn discard(&self, image_ref: &ImageRef) {
        let path = self.resolve(image_ref);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "could not remove orphaned square image"
            );
        }
    }

    /// Deletes the given blobs, then the blob directory if nothing else is in
    /// it. Failures are logged and skipped; returns how many blobs remain.
    pub fn clear<'a>(&self, refs: impl IntoIterator<Item = &'a ImageRef>) -> usize {
        let mut left = 0;
        for image_ref in refs {
            let path = self.resolve(image_ref);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "could not remove square image"
                    );
                    left += 1;
                }
            }
        }
        let _ = fs::remove_dir(&self.dir);
        left
    }

    fn image_ref(&self, path: &Path) -> ImageRef {
        let relative = path.strip_prefix(&self.base).unwrap_or(path);
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        ImageRef::new(parts.join("/"))
    }
}
