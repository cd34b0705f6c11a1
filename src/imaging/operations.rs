//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! configuration, compute parameters, and call the backend. Failures are
//! isolated per derivative: one width failing to encode is reported in its
//! [`VariantOutcome`] and the remaining widths are still attempted.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{LadderStep, calculate_ladder, calculate_placeholder_dimensions};
use super::params::{OutputFormat, PlaceholderParams, Quality, ResizeParams};
use crate::naming::variant_file_name;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Configuration for derivative ladder generation.
#[derive(Debug, Clone)]
pub struct LadderConfig {
    /// Ascending target widths.
    pub sizes: Vec<u32>,
    pub quality: Quality,
    pub format: OutputFormat,
}

/// A derivative that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVariant {
    pub target: u32,
    pub width: u32,
    pub height: u32,
    /// File name inside the identifier's output directory.
    pub file_name: String,
}

/// What happened to one rung of the ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    Written(GeneratedVariant),
    Failed { target: u32, width: u32, error: String },
}

impl VariantOutcome {
    pub fn written(&self) -> Option<&GeneratedVariant> {
        match self {
            Self::Written(v) => Some(v),
            Self::Failed { .. } => None,
        }
    }
}

/// Plan the resize operations for a source without executing them.
pub fn plan_variants(
    source: &Path,
    output_dir: &Path,
    identifier: &str,
    original_dims: (u32, u32),
    config: &LadderConfig,
) -> Vec<(LadderStep, ResizeParams)> {
    calculate_ladder(original_dims, &config.sizes)
        .into_iter()
        .map(|step| {
            let file_name = variant_file_name(identifier, step.target, config.format.extension());
            let params = ResizeParams {
                source: source.to_path_buf(),
                output: output_dir.join(file_name),
                width: step.width,
                height: step.height,
                quality: config.quality,
                format: config.format,
            };
            (step, params)
        })
        .collect()
}

/// Create every derivative on the ladder, ascending by width.
///
/// Widths wider than the source are clamped or skipped (see
/// [`calculate_ladder`]). Each width is attempted independently.
pub fn create_variants(
    backend: &impl ImageBackend,
    source: &Path,
    output_dir: &Path,
    identifier: &str,
    original_dims: (u32, u32),
    config: &LadderConfig,
) -> Vec<VariantOutcome> {
    plan_variants(source, output_dir, identifier, original_dims, config)
        .into_iter()
        .map(|(step, params)| match backend.resize(&params) {
            Ok(()) => VariantOutcome::Written(GeneratedVariant {
                target: step.target,
                width: step.width,
                height: step.height,
                file_name: params
                    .output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
            Err(e) => VariantOutcome::Failed {
                target: step.target,
                width: step.width,
                error: e.to_string(),
            },
        })
        .collect()
}

/// Configuration for the blur-up placeholder.
#[derive(Debug, Clone)]
pub struct PlaceholderConfig {
    pub width: u32,
    pub quality: Quality,
    pub format: OutputFormat,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            width: 20,
            quality: Quality::new(40),
            format: OutputFormat::WebP,
        }
    }
}

/// Encode bytes as a base64 `data:` URI.
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Create the placeholder and return it as a data URI.
pub fn create_placeholder(
    backend: &impl ImageBackend,
    source: &Path,
    original_dims: (u32, u32),
    config: &PlaceholderConfig,
) -> Result<String> {
    let (width, height) = calculate_placeholder_dimensions(original_dims, config.width);
    let bytes = backend.placeholder(&PlaceholderParams {
        source: source.to_path_buf(),
        width,
        height,
        quality: config.quality,
        format: config.format,
    })?;
    Ok(data_uri(config.format.mime_type(), &bytes))
}
