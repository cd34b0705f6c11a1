//! Pure Rust decode/resize backend with libwebp and rav1e encoders.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image` crate (pure Rust decoders) |
//! | Identify | `image::image_dimensions` (header only) |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP (lossy) | `webp::Encoder` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{OutputFormat, PlaceholderParams, ResizeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Source extensions the transcoder picks up (lowercase, no dot).
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Production backend. Stateless; one instance is shared across workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Encode into an in-memory buffer in the requested format.
fn encode(img: &DynamicImage, format: OutputFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    match format {
        OutputFormat::WebP => encode_webp(img, quality),
        OutputFormat::Avif => encode_avif(img, quality),
    }
}

fn encode_webp(img: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    // libwebp only accepts 8-bit RGB/RGBA buffers.
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
    };
    let encoder = webp::Encoder::from_image(img)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encoder setup failed: {e}")))?;
    Ok(encoder.encode(quality as f32).to_vec())
}

fn encode_avif(img: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 6, quality as u8);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("AVIF encode failed: {}", e)))?;
    Ok(buf)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let resized = if (img.width(), img.height()) == (params.width, params.height) {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        let bytes = encode(&resized, params.format, params.quality.value())?;
        write_file(&params.output, &bytes)
    }

    fn placeholder(&self, params: &PlaceholderParams) -> Result<Vec<u8>, BackendError> {
        let img = load_image(&params.source)?;
        let tiny = img.resize_exact(params.width, params.height, FilterType::Triangle);
        encode(&tiny, params.format, params.quality.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use image::{ImageEncoder, RgbImage};

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "webp"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
        assert!(!exts.contains(&"avif"));
    }

    /// Create a small valid JPEG file with the given dimensions.
    fn create_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let file = std::fs::File::create(path).unwrap();
        let writer = std::io::BufWriter::new(file);
        image::codecs::jpeg::JpegEncoder::new(writer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gown.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/gown.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn resize_synthetic_to_webp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 400, 300);

        let output = tmp.path().join("resized.webp");
        RustBackend::new()
            .resize(&ResizeParams {
                source,
                output: output.clone(),
                width: 200,
                height: 150,
                quality: Quality::new(75),
                format: OutputFormat::WebP,
            })
            .unwrap();

        assert_eq!(image::image_dimensions(&output).unwrap(), (200, 150));
    }

    #[test]
    fn resize_synthetic_to_avif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 64, 48);

        let output = tmp.path().join("resized.avif");
        RustBackend::new()
            .resize(&ResizeParams {
                source,
                output: output.clone(),
                width: 32,
                height: 24,
                quality: Quality::new(75),
                format: OutputFormat::Avif,
            })
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn resize_undecodable_source_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.jpg");
        std::fs::write(&source, b"not an image").unwrap();

        let result = RustBackend::new().resize(&ResizeParams {
            source,
            output: tmp.path().join("out.webp"),
            width: 10,
            height: 10,
            quality: Quality::new(75),
            format: OutputFormat::WebP,
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn placeholder_is_small_webp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 800, 600);

        let bytes = RustBackend::new()
            .placeholder(&PlaceholderParams {
                source,
                width: 20,
                height: 15,
                quality: Quality::new(40),
                format: OutputFormat::WebP,
            })
            .unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 15));
    }
}
