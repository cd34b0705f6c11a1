//! Batch transcoding of source images into derivatives and a manifest.
//!
//! Takes a directory of originals and produces, for each one, a ladder of
//! resized derivatives plus an inline blur-up placeholder. The run ends with a
//! single manifest write describing everything that was produced.
//!
//! ## Output Structure
//!
//! ```text
//! public/images/
//! ├── manifest.json
//! └── optimized/
//!     ├── Evening-Gown/
//!     │   ├── Evening-Gown-320.webp
//!     │   ├── Evening-Gown-640.webp
//!     │   ├── Evening-Gown-1024.webp
//!     │   └── Evening-Gown-2048.webp      # 1800px wide: clamped, not upscaled
//!     └── navy-midi/
//!         └── ...
//! ```
//!
//! ## Failure Handling
//!
//! | Condition | Result |
//! |---|---|
//! | Input directory missing | [`OptimizeOutcome::InputMissing`], nothing written |
//! | No supported images | [`OptimizeOutcome::NoImages`], nothing written |
//! | One width fails to encode | logged, other widths and images continue |
//! | Placeholder fails | logged, entry gets `placeholder: null` |
//! | Source unreadable | logged, entry present with nulls |
//! | Output directory cannot be created | [`OptimizeError::CreateOutputDir`] |
//! | Manifest cannot be written | [`OptimizeError::WriteManifest`] |
//!
//! Every run recomputes every entry. There is no cache: derivatives are
//! overwritten and the manifest is replaced wholesale.
//!
//! ## Parallel Processing
//!
//! Images are processed in parallel using [rayon](https://docs.rs/rayon).
//! Widths within one image are encoded in ladder order. Results are gathered
//! into a sorted map so the manifest is identical regardless of scheduling.

use crate::config::Config;
use crate::imaging::{
    ImageBackend, LadderConfig, PlaceholderConfig, Quality, RustBackend, VariantOutcome,
    create_placeholder, create_variants, get_dimensions, supported_input_extensions,
};
use crate::manifest::{Manifest, ManifestEntry, ManifestError, Variant};
use crate::naming::{identifier_for_path, join_url};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write manifest {path}: {source}")]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

/// Everything one transcoder run needs, with paths already resolved.
#[derive(Debug, Clone)]
pub struct OptimizeConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// URL prefix `output_dir` is served under.
    pub public_url: String,
    pub ladder: LadderConfig,
    /// `None` disables placeholder generation.
    pub placeholder: Option<PlaceholderConfig>,
}

impl OptimizeConfig {
    /// Build from a loaded [`Config`], resolving paths against `root`.
    pub fn from_config(config: &Config, root: &Path) -> Self {
        let paths = config.paths.resolve(root);
        let format = config.images.format;
        Self {
            input_dir: paths.input_dir,
            output_dir: paths.output_dir,
            manifest_path: paths.manifest_path,
            public_url: paths.public_url,
            ladder: LadderConfig {
                sizes: config.ladder(),
                quality: Quality::new(config.images.quality),
                format,
            },
            placeholder: config.placeholder.enabled.then(|| PlaceholderConfig {
                width: config.placeholder.width,
                quality: Quality::new(config.placeholder.quality),
                format,
            }),
        }
    }
}

/// How a run ended. All three are successful exits.
#[derive(Debug)]
pub enum OptimizeOutcome {
    InputMissing { input_dir: PathBuf },
    NoImages { input_dir: PathBuf },
    Written { manifest_path: PathBuf, manifest: Manifest },
}

/// Per-width result reported to the progress printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantReport {
    pub target: u32,
    pub width: u32,
    pub status: VariantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantStatus {
    Encoded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderStatus {
    Generated,
    Disabled,
    Failed(String),
}

/// Progress event emitted as each image finishes.
#[derive(Debug, Clone)]
pub enum OptimizeEvent {
    Started {
        image_count: usize,
    },
    ImageProcessed {
        /// 1-based position in discovery order.
        index: usize,
        identifier: String,
        /// Path relative to the input directory.
        source_path: String,
        /// `None` when the source could not be identified at all.
        dimensions: Option<(u32, u32)>,
        variants: Vec<VariantReport>,
        placeholder: PlaceholderStatus,
    },
    ImageSkipped {
        source_path: String,
        reason: String,
    },
}

/// A discovered source image with its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub relative_path: String,
    pub identifier: String,
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| supported_input_extensions().contains(&e.as_str()))
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Recursively find supported images under `root`, in sorted path order.
///
/// Unreadable entries are logged and skipped.
pub fn discover_sources(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry during discovery");
                continue;
            }
        };
        if entry.file_type().is_file() && has_supported_extension(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    found
}

/// Assign identifiers, dropping files that collide with an earlier one.
///
/// Returns the kept sources and `(relative path, reason)` for each drop.
pub fn assign_identifiers(
    root: &Path,
    paths: Vec<PathBuf>,
) -> (Vec<SourceImage>, Vec<(String, String)>) {
    let mut claimed: BTreeMap<String, String> = BTreeMap::new();
    let mut kept = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let relative_path = relative_display(root, &path);
        let Some(identifier) = identifier_for_path(&path) else {
            skipped.push((relative_path, "file name has no usable stem".to_string()));
            continue;
        };
        if let Some(first) = claimed.get(&identifier) {
            skipped.push((
                relative_path,
                format!("identifier {identifier} already taken by {first}"),
            ));
            continue;
        }
        claimed.insert(identifier.clone(), relative_path.clone());
        kept.push(SourceImage {
            path,
            relative_path,
            identifier,
        });
    }
    (kept, skipped)
}

fn create_dir(path: &Path) -> Result<(), OptimizeError> {
    std::fs::create_dir_all(path).map_err(|source| OptimizeError::CreateOutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the transcoder with the production backend.
pub fn optimize(
    config: &OptimizeConfig,
    events: Option<Sender<OptimizeEvent>>,
) -> Result<OptimizeOutcome, OptimizeError> {
    optimize_with_backend(&RustBackend::new(), config, events)
}

/// Run the transcoder using a specific backend (allows testing with mock).
pub fn optimize_with_backend(
    backend: &impl ImageBackend,
    config: &OptimizeConfig,
    events: Option<Sender<OptimizeEvent>>,
) -> Result<OptimizeOutcome, OptimizeError> {
    let input_dir = &config.input_dir;
    if !input_dir.is_dir() {
        tracing::info!(
            input_dir = %input_dir.display(),
            "Input directory not found, skipping image optimization"
        );
        return Ok(OptimizeOutcome::InputMissing {
            input_dir: input_dir.clone(),
        });
    }

    let (sources, skipped) = assign_identifiers(input_dir, discover_sources(input_dir));
    for (source_path, reason) in skipped {
        tracing::warn!(source = %source_path, "Skipping image: {reason}");
        emit(&events, OptimizeEvent::ImageSkipped { source_path, reason });
    }

    if sources.is_empty() {
        tracing::info!(
            input_dir = %input_dir.display(),
            "No images found, nothing to optimize"
        );
        return Ok(OptimizeOutcome::NoImages {
            input_dir: input_dir.clone(),
        });
    }

    create_dir(&config.output_dir)?;
    emit(
        &events,
        OptimizeEvent::Started {
            image_count: sources.len(),
        },
    );

    let entries: Vec<(String, ManifestEntry)> = sources
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            let entry = process_image(backend, source, i + 1, config, &events)?;
            Ok((source.identifier.clone(), entry))
        })
        .collect::<Result<_, OptimizeError>>()?;

    let mut manifest = Manifest::new();
    for (identifier, entry) in entries {
        manifest.insert(identifier, entry);
    }

    manifest
        .write_atomic(&config.manifest_path)
        .map_err(|source| OptimizeError::WriteManifest {
            path: config.manifest_path.clone(),
            source,
        })?;
    tracing::info!(
        manifest = %config.manifest_path.display(),
        entries = manifest.len(),
        "Wrote image manifest"
    );

    Ok(OptimizeOutcome::Written {
        manifest_path: config.manifest_path.clone(),
        manifest,
    })
}

fn emit(events: &Option<Sender<OptimizeEvent>>, event: OptimizeEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Produce every derivative and the placeholder for one source.
///
/// Only a failure to create the identifier's output directory is returned as
/// an error; everything else is folded into the entry.
fn process_image(
    backend: &impl ImageBackend,
    source: &SourceImage,
    index: usize,
    config: &OptimizeConfig,
    events: &Option<Sender<OptimizeEvent>>,
) -> Result<ManifestEntry, OptimizeError> {
    let image_dir = config.output_dir.join(&source.identifier);
    create_dir(&image_dir)?;

    let dimensions = match get_dimensions(backend, &source.path) {
        Ok(dims) => Some(dims),
        Err(e) => {
            tracing::warn!(
                source = %source.relative_path,
                error = %e,
                "Cannot read source image, recording empty entry"
            );
            None
        }
    };

    let outcomes = match dimensions {
        Some(dims) => create_variants(
            backend,
            &source.path,
            &image_dir,
            &source.identifier,
            dims,
            &config.ladder,
        ),
        None => Vec::new(),
    };

    let mut produced = Vec::new();
    let mut reports = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            VariantOutcome::Written(v) => {
                let url = join_url(&config.public_url, &[&source.identifier, &v.file_name]);
                reports.push(VariantReport {
                    target: v.target,
                    width: v.width,
                    status: VariantStatus::Encoded,
                });
                produced.push((
                    Variant {
                        width: v.width,
                        url,
                    },
                    v.height,
                ));
            }
            VariantOutcome::Failed {
                target,
                width,
                error,
            } => {
                tracing::warn!(
                    source = %source.relative_path,
                    width = target,
                    error = %error,
                    "Failed to create derivative"
                );
                reports.push(VariantReport {
                    target,
                    width,
                    status: VariantStatus::Failed(error),
                });
            }
        }
    }

    let (placeholder, placeholder_status) = match (&config.placeholder, dimensions) {
        (None, _) => (None, PlaceholderStatus::Disabled),
        (Some(_), None) => (
            None,
            PlaceholderStatus::Failed("source dimensions unavailable".to_string()),
        ),
        (Some(settings), Some(dims)) => {
            match create_placeholder(backend, &source.path, dims, settings) {
                Ok(uri) => (Some(uri), PlaceholderStatus::Generated),
                Err(e) => {
                    tracing::warn!(
                        source = %source.relative_path,
                        error = %e,
                        "Failed to create placeholder"
                    );
                    (None, PlaceholderStatus::Failed(e.to_string()))
                }
            }
        }
    };

    emit(
        events,
        OptimizeEvent::ImageProcessed {
            index,
            identifier: source.identifier.clone(),
            source_path: source.relative_path.clone(),
            dimensions,
            variants: reports,
            placeholder: placeholder_status,
        },
    );

    Ok(ManifestEntry::from_variants(produced, placeholder))
}
