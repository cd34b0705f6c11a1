//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what derivatives to create) and the
//! [`backend`](super::backend) (which does the actual pixel work), so tests can
//! swap in a mock backend without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`OutputFormat`]: The lossy codec derivatives are written in.
//! - [`ResizeParams`]: Source, output path, target dimensions, quality, format.
//! - [`PlaceholderParams`]: Source, tiny dimensions, quality, format; encoded in memory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Web-efficient lossy output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    WebP,
    Avif,
}

impl OutputFormat {
    /// Standard file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    /// MIME type used in placeholder data URIs.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }
}

/// Parameters for writing one resized derivative to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub format: OutputFormat,
}

/// Parameters for encoding a tiny placeholder into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(40).value(), 40);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_75() {
        assert_eq!(Quality::default().value(), 75);
    }

    #[test]
    fn format_extensions_and_mime() {
        assert_eq!(OutputFormat::WebP.extension(), "webp");
        assert_eq!(OutputFormat::Avif.extension(), "avif");
        assert_eq!(OutputFormat::WebP.mime_type(), "image/webp");
        assert_eq!(OutputFormat::Avif.mime_type(), "image/avif");
    }

    #[test]
    fn format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OutputFormat::WebP).unwrap(), "\"webp\"");
        let parsed: OutputFormat = serde_json::from_str("\"avif\"").unwrap();
        assert_eq!(parsed, OutputFormat::Avif);
    }
}
