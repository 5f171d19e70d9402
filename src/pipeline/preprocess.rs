//! Image preprocessing for provider upload.
//!
//! Normalizes an arbitrary captured/selected photo into a payload-ready
//! form: EXIF orientation fixed so pixel data is top-left-origin (providers
//! ignore orientation metadata), dimensions bounded, lossy re-encode to
//! bound payload size. Pure transform; no I/O beyond the returned bytes.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use tracing::debug;

use super::AnalysisError;

// ──────────────────────────────────────────────
// Constants
// ──────────────────────────────────────────────

/// Maximum input size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum plausible size for a decodable image file.
const MIN_IMAGE_BYTES: usize = 32;

/// Longest side of the uploaded image. Skin-lesion detail survives 1024px;
/// anything larger only inflates the base64 payload.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// JPEG re-encode quality (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ──────────────────────────────────────────────
// Trait + result type
// ──────────────────────────────────────────────

/// Prepares a raw photo for provider upload.
///
/// Must be idempotent: re-preparing an already-prepared image yields no
/// further downscale and no orientation change.
pub trait ImagePreprocessor: Send + Sync {
    fn prepare(&self, image_bytes: &[u8]) -> Result<PreparedImage, AnalysisError>;
}

/// Payload-ready image: oriented, bounded, JPEG-encoded.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub jpeg_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

// ──────────────────────────────────────────────
// PhotoPreprocessor
// ──────────────────────────────────────────────

/// Production preprocessor: validate → decode → orient → downscale → encode.
pub struct PhotoPreprocessor {
    max_dimension: u32,
    jpeg_quality: u8,
}

impl Default for PhotoPreprocessor {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PhotoPreprocessor {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension,
            jpeg_quality,
        }
    }
}

impl ImagePreprocessor for PhotoPreprocessor {
    fn prepare(&self, image_bytes: &[u8]) -> Result<PreparedImage, AnalysisError> {
        validate_image_bytes(image_bytes)?;

        let img = image::load_from_memory(image_bytes).map_err(|e| {
            AnalysisError::ImageProcessing(format!("Failed to decode image: {e}"))
        })?;
        let (orig_w, orig_h) = img.dimensions();

        // Apply EXIF orientation from the raw bytes. The re-encode below
        // strips metadata, so a second pass sees orientation 1 (idempotent).
        let orientation = read_exif_orientation(image_bytes);
        let img = apply_orientation(img, orientation);

        // Downscale so the longer side equals max_dimension; never upscale.
        let (w, h) = img.dimensions();
        let img = if w.max(h) > self.max_dimension {
            img.resize(self.max_dimension, self.max_dimension, FilterType::CatmullRom)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        let jpeg_bytes = encode_jpeg(&rgb, self.jpeg_quality)?;

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            prepared = format!("{width}x{height}"),
            orientation,
            jpeg_size = jpeg_bytes.len(),
            "Image prepared for provider upload"
        );

        Ok(PreparedImage {
            jpeg_bytes,
            width,
            height,
        })
    }
}

// ──────────────────────────────────────────────
// EXIF orientation
// ──────────────────────────────────────────────

/// Read EXIF orientation tag 0x0112 from raw image bytes.
/// Returns 1 (normal) if no EXIF data or the tag is absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// Values: 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW,
/// 8 = 270deg CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

/// Validate image bytes before decoding.
/// Returns an early error for clearly invalid input without decoding.
fn validate_image_bytes(bytes: &[u8]) -> Result<(), AnalysisError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(AnalysisError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AnalysisError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Encode an RGB image as JPEG at the given quality.
fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| AnalysisError::ImageProcessing(format!("JPEG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ──────────────────────────────────────────────
// Mock (testing)
// ──────────────────────────────────────────────

/// Mock preprocessor for orchestrator tests; skips real image work.
pub struct MockImagePreprocessor {
    fail: bool,
}

impl MockImagePreprocessor {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor for MockImagePreprocessor {
    fn prepare(&self, _image_bytes: &[u8]) -> Result<PreparedImage, AnalysisError> {
        if self.fail {
            return Err(AnalysisError::ImageProcessing(
                "Mock preprocessing failure".into(),
            ));
        }
        Ok(PreparedImage {
            jpeg_bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 64,
            height: 64,
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Create a PNG test image with the given dimensions.
    fn make_test_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 90, 80]));
        let dynamic = DynamicImage::ImageRgb8(img);
        let mut cursor = Cursor::new(Vec::new());
        dynamic
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn large_image_downscaled_to_max_dimension() {
        let pre = PhotoPreprocessor::default();
        let result = pre.prepare(&make_test_image(4000, 2000)).unwrap();
        assert_eq!(result.width, 1024);
        assert_eq!(result.height, 512);

        let out = decode(&result.jpeg_bytes);
        assert_eq!(out.dimensions(), (1024, 512));
    }

    #[test]
    fn portrait_image_bounds_longer_side() {
        let pre = PhotoPreprocessor::default();
        let result = pre.prepare(&make_test_image(1500, 3000)).unwrap();
        assert_eq!(result.height, 1024);
        assert_eq!(result.width, 512);
    }

    #[test]
    fn small_image_not_upscaled() {
        let pre = PhotoPreprocessor::default();
        let result = pre.prepare(&make_test_image(300, 200)).unwrap();
        assert_eq!(result.width, 300);
        assert_eq!(result.height, 200);
    }

    #[test]
    fn output_is_decodable_jpeg() {
        let pre = PhotoPreprocessor::default();
        let result = pre.prepare(&make_test_image(100, 100)).unwrap();
        // JPEG SOI marker
        assert_eq!(&result.jpeg_bytes[..2], &[0xFF, 0xD8]);
        decode(&result.jpeg_bytes);
    }

    #[test]
    fn prepare_is_idempotent_on_dimensions() {
        let pre = PhotoPreprocessor::default();
        let first = pre.prepare(&make_test_image(2048, 1536)).unwrap();
        let second = pre.prepare(&first.jpeg_bytes).unwrap();

        // Lossy re-encode is not byte-identical, but dimensions and
        // orientation must stabilize after the first pass.
        assert_eq!((second.width, second.height), (first.width, first.height));

        let third = pre.prepare(&second.jpeg_bytes).unwrap();
        assert_eq!((third.width, third.height), (second.width, second.height));
    }

    #[test]
    fn rejects_too_small_input() {
        let pre = PhotoPreprocessor::default();
        let err = pre.prepare(&[0x89, 0x50]).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn rejects_undecodable_bytes() {
        let pre = PhotoPreprocessor::default();
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(32);
        let err = pre.prepare(&garbage).unwrap_err();
        assert!(matches!(err, AnalysisError::ImageProcessing(_)));
    }

    #[test]
    fn custom_max_dimension_respected() {
        let pre = PhotoPreprocessor::new(256, 80);
        let result = pre.prepare(&make_test_image(1000, 500)).unwrap();
        assert_eq!(result.width, 256);
        assert_eq!(result.height, 128);
    }

    // ── EXIF orientation ──

    #[test]
    fn exif_no_data_returns_identity() {
        let png = make_test_image(10, 10);
        assert_eq!(read_exif_orientation(&png), 1);
    }

    #[test]
    fn apply_orientation_rotations_swap_dimensions() {
        for orientation in [5u32, 6, 7, 8] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(10, 20));
            let out = apply_orientation(img, orientation);
            assert_eq!(out.dimensions(), (20, 10), "orientation {orientation}");
        }
    }

    #[test]
    fn apply_orientation_flips_keep_dimensions() {
        for orientation in [1u32, 2, 3, 4, 99] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(10, 20));
            let out = apply_orientation(img, orientation);
            assert_eq!(out.dimensions(), (10, 20), "orientation {orientation}");
        }
    }

    // ── Mock ──

    #[test]
    fn mock_preprocessor_ok_and_failing() {
        assert!(MockImagePreprocessor::new().prepare(b"anything").is_ok());
        assert!(MockImagePreprocessor::failing().prepare(b"anything").is_err());
    }
}
