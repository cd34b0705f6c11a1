//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Each image leads with its position and identifier; the source file and
//! per-width results are shown as indented context lines underneath. Paths are
//! secondary, so the output reads like an inventory of what was published.
//!
//! # Output Format
//!
//! ## Optimize
//!
//! ```text
//! Optimizing 2 images
//! 001 Evening-Gown (1800x1200)
//!     Source: gowns/Evening Gown.jpg
//!     320px: encoded
//!     640px: encoded
//!     1024px: failed (Processing failed: ...)
//!     2048px: encoded at 1800px
//!     placeholder: generated
//! Skipped gowns/old/Evening Gown.png: identifier Evening-Gown already taken by gowns/Evening Gown.jpg
//! Wrote public/images/manifest.json (2 images, 7 variants)
//! ```
//!
//! ## Resolve
//!
//! ```text
//! Evening-Gown (manifest)
//!     src: /images/optimized/Evening-Gown/Evening-Gown-320.webp
//!     320w: /images/optimized/Evening-Gown/Evening-Gown-320.webp
//!     1800w: /images/optimized/Evening-Gown/Evening-Gown-2048.webp
//!     sizes: 100vw
//!     intrinsic: 1800x1200
//!     placeholder: 212 chars
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::optimize::{OptimizeEvent, OptimizeOutcome, PlaceholderStatus, VariantStatus};
use crate::resolver::{ResolvedImage, Resolution};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_dimensions(width: Option<u32>, height: Option<u32>) -> Option<String> {
    match (width, height) {
        (Some(w), Some(h)) => Some(format!("{w}x{h}")),
        (Some(w), None) => Some(format!("{w}w")),
        _ => None,
    }
}

// ============================================================================
// Optimize
// ============================================================================

/// Format a single optimize progress event as display lines.
pub fn format_optimize_event(event: &OptimizeEvent) -> Vec<String> {
    match event {
        OptimizeEvent::Started { image_count } => {
            let noun = if *image_count == 1 { "image" } else { "images" };
            vec![format!("Optimizing {image_count} {noun}")]
        }
        OptimizeEvent::ImageSkipped {
            source_path,
            reason,
        } => vec![format!("Skipped {source_path}: {reason}")],
        OptimizeEvent::ImageProcessed {
            index,
            identifier,
            source_path,
            dimensions,
            variants,
            placeholder,
        } => {
            let mut lines = Vec::new();
            let header = match dimensions {
                Some((w, h)) => format!("{} {} ({}x{})", format_index(*index), identifier, w, h),
                None => format!("{} {} (unreadable)", format_index(*index), identifier),
            };
            lines.push(header);
            lines.push(format!("{}Source: {}", indent(1), source_path));

            for variant in variants {
                let status = match &variant.status {
                    VariantStatus::Encoded if variant.width == variant.target => {
                        "encoded".to_string()
                    }
                    VariantStatus::Encoded => format!("encoded at {}px", variant.width),
                    VariantStatus::Failed(error) => format!("failed ({error})"),
                };
                lines.push(format!("{}{}px: {}", indent(1), variant.target, status));
            }

            let placeholder = match placeholder {
                PlaceholderStatus::Generated => "generated".to_string(),
                PlaceholderStatus::Disabled => "disabled".to_string(),
                PlaceholderStatus::Failed(error) => format!("failed ({error})"),
            };
            lines.push(format!("{}placeholder: {}", indent(1), placeholder));
            lines
        }
    }
}

/// Format the summary line(s) for a finished run.
pub fn format_optimize_outcome(outcome: &OptimizeOutcome) -> Vec<String> {
    match outcome {
        OptimizeOutcome::InputMissing { input_dir } => vec![format!(
            "No input directory at {}, skipping",
            input_dir.display()
        )],
        OptimizeOutcome::NoImages { input_dir } => {
            vec![format!("No images found in {}", input_dir.display())]
        }
        OptimizeOutcome::Written {
            manifest_path,
            manifest,
        } => {
            let variants: usize = manifest.iter().map(|(_, e)| e.variants.len()).sum();
            let empty: Vec<&str> = manifest
                .iter()
                .filter(|(_, e)| e.is_empty())
                .map(|(id, _)| id)
                .collect();
            let mut lines = vec![format!(
                "Wrote {} ({} images, {} variants)",
                manifest_path.display(),
                manifest.len(),
                variants
            )];
            if !empty.is_empty() {
                lines.push(format!(
                    "{}No variants produced for: {}",
                    indent(1),
                    empty.join(", ")
                ));
            }
            lines
        }
    }
}

/// Print an optimize event to stdout.
pub fn print_optimize_event(event: &OptimizeEvent) {
    for line in format_optimize_event(event) {
        println!("{}", line);
    }
}

/// Print the run summary to stdout.
pub fn print_optimize_outcome(outcome: &OptimizeOutcome) {
    for line in format_optimize_outcome(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve
// ============================================================================

fn resolution_label(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Manifest => "manifest",
        Resolution::EmptyEntry => "fallback: entry has no variants",
        Resolution::MissingEntry => "fallback: not in manifest",
        Resolution::NoManifest => "fallback: manifest unavailable",
    }
}

/// Format one resolved image.
pub fn format_resolved(image: &ResolvedImage, sizes: &str) -> Vec<String> {
    let mut lines = vec![
        format!("{} ({})", image.identifier, resolution_label(image.resolution)),
        format!("{}src: {}", indent(1), image.smallest_url),
    ];
    for candidate in &image.srcset {
        match candidate.width {
            Some(w) => lines.push(format!("{}{}w: {}", indent(1), w, candidate.url)),
            None => lines.push(format!("{}srcset: {}", indent(1), candidate.url)),
        }
    }
    if !image.srcset.is_empty() {
        lines.push(format!("{}sizes: {}", indent(1), sizes));
    }
    if let Some(dims) = format_dimensions(image.intrinsic_width, image.intrinsic_height) {
        lines.push(format!("{}intrinsic: {}", indent(1), dims));
    }
    if let Some(placeholder) = &image.placeholder {
        lines.push(format!("{}placeholder: {} chars", indent(1), placeholder.len()));
    }
    lines
}

/// Print resolved images to stdout.
pub fn print_resolved(images: &[ResolvedImage], sizes: &str) {
    for image in images {
        for line in format_resolved(image, sizes) {
            println!("{}", line);
        }
    }
}
