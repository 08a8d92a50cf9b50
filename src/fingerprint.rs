//! Whole-board image fingerprints.
//! The image is reduced to a small fixed-size RGB canvas before hashing so the
//! same visual content decoded from PNG, BMP or a lossless re-save collides.
//! SHA-256 is only there for collision resistance; nothing here is a security boundary.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::error::{FeedbackError, Result};

pub const DEFAULT_FINGERPRINT_SIZE: u32 = 64;

/// Content digest of a whole-board image, used only as a grouping key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(digest: impl Into<String>) -> Result<Self> {
        let digest = digest.into();
        if digest.trim().is_empty() {
            return Err(FeedbackError::Fingerprint("empty digest".to_string()));
        }
        Ok(Self(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageFingerprinter {
    size: u32,
}

impl Default for ImageFingerprinter {
    fn default() -> Self {
        Self { size: DEFAULT_FINGERPRINT_SIZE }
    }
}

impl ImageFingerprinter {
    /// `size` is the edge of the square canvas images are reduced to (min 1).
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    pub fn fingerprint(&self, image: &DynamicImage) -> Result<Fingerprint> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(FeedbackError::Fingerprint(format!("degenerate {w}x{h} image")));
        }
        let canonical = image
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();
        let digest = Sha256::digest(canonical.as_raw());
        Fingerprint::new(hex::encode(digest))
    }
}

/// A loaded board image together with its fingerprint, computed once on load.
#[derive(Clone, Debug)]
pub struct BoardImage {
    image: DynamicImage,
    fingerprint: Fingerprint,
}

impl BoardImage {
    pub fn new(image: DynamicImage, fingerprinter: &ImageFingerprinter) -> Result<Self> {
        let fingerprint = fingerprinter.fingerprint(&image)?;
        tracing::debug!(fingerprint = fingerprint.short(), "board image fingerprinted");
        Ok(Self { image, fingerprint })
    }

    pub fn open(path: impl AsRef<Path>, fingerprinter: &ImageFingerprinter) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| FeedbackError::Blob {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(image, fingerprinter)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Cuts out one cell of the displayed 8x8 grid (row 0 = top of the image).
    pub fn crop_cell(&self, row: u32, col: u32) -> Result<DynamicImage> {
        if row > 7 || col > 7 {
            return Err(FeedbackError::OutOfRange { row, col });
        }
        let (w, h) = self.image.dimensions();
        let (cell_w, cell_h) = (w / 8, h / 8);
        if cell_w == 0 || cell_h == 0 {
            return Err(FeedbackError::Fingerprint(format!(
                "{w}x{h} board is too small to split into squares"
            )));
        }
        Ok(self.image.crop_imm(col * cell_w, row * cell_h, cell_w, cell_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn solid(w: u32, h: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([value, value, value])))
    }

    #[test]
    fn test_deterministic_hex_digest() {
        let fp = ImageFingerprinter::default();
        let a = fp.fingerprint(&solid(800, 800, 128)).unwrap();
        let b = fp.fingerprint(&solid(800, 800, 128)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_content_differs() {
        let fp = ImageFingerprinter::default();
        let a = fp.fingerprint(&solid(800, 800, 128)).unwrap();
        let b = fp.fingerprint(&solid(800, 800, 200)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_lossless_reencoding_collides() {
        let mut img = RgbImage::new(64, 64);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]);
        }
        let original = DynamicImage::ImageRgb8(img);

        let mut png = Vec::new();
        original.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        // RGBA decode of the same pixels
        let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());

        let fp = ImageFingerprinter::default();
        assert_eq!(fp.fingerprint(&original).unwrap(), fp.fingerprint(&rgba).unwrap());
    }

    #[test]
    fn test_zero_size_image_rejected() {
        let fp = ImageFingerprinter::default();
        assert!(matches!(
            fp.fingerprint(&solid(0, 0, 0)),
            Err(FeedbackError::Fingerprint(_))
        ));
        assert!(BoardImage::new(solid(10, 0, 0), &fp).is_err());
    }

    #[test]
    fn test_empty_digest_rejected() {
        assert!(Fingerprint::new("  ").is_err());
        assert_eq!(Fingerprint::new("ABC123").unwrap().short(), "ABC123");
    }

    #[test]
    fn test_board_image_caches_fingerprint_and_crops() {
        let fp = ImageFingerprinter::new(16);
        let board = BoardImage::new(solid(800, 800, 90), &fp).unwrap();
        assert_eq!(board.fingerprint(), &fp.fingerprint(board.image()).unwrap());
        let cell = board.crop_cell(7, 7).unwrap();
        assert_eq!(cell.dimensions(), (100, 100));
        assert!(board.crop_cell(8, 0).is_err());
    }
}
