//! Config module.
//! Manages I/O for the store config JSON (log location, image directory,
//! fingerprint resolution). Uses serde for JSON serialization.
//! A missing config file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fingerprint::{DEFAULT_FINGERPRINT_SIZE, ImageFingerprinter};

pub const DEFAULT_FEEDBACK_FILE: &str = "output/piece_recognition_feedback.json";
pub const IMAGES_DIR_NAME: &str = "training_images";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feedback_file: PathBuf,
    /// Defaults to `training_images/` next to the feedback file.
    pub images_dir: Option<PathBuf>,
    pub fingerprint_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feedback_file: PathBuf::from(DEFAULT_FEEDBACK_FILE),
            images_dir: None,
            fingerprint_size: DEFAULT_FINGERPRINT_SIZE,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Directory image refs are relative to.
    pub fn log_dir(&self) -> PathBuf {
        match self.feedback_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.images_dir
            .clone()
            .unwrap_or_else(|| self.log_dir().join(IMAGES_DIR_NAME))
    }

    pub fn fingerprinter(&self) -> ImageFingerprinter {
        ImageFingerprinter::new(self.fingerprint_size)
    }
}
