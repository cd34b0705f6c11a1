//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `lookbook.toml`. The file is
//! optional and sparse: stock defaults are serialized to a TOML table and the
//! user file is merged on top, so a project only writes the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! input_dir = "assets/images/original"        # Source images (scanned recursively)
//! output_dir = "public/images/optimized"      # Derivatives land here
//! manifest_path = "public/images/manifest.json"
//! public_url = "/images/optimized"            # URL prefix output_dir is served under
//!
//! [images]
//! sizes = [320, 640, 1024, 2048]              # Width ladder
//! quality = 75
//! format = "webp"                             # "webp" or "avif"
//!
//! [placeholder]
//! enabled = true
//! width = 20
//! quality = 40
//!
//! [resolver]
//! manifest_url = "/images/manifest.json"
//! sizes = "100vw"
//!
//! [display]
//! root_margin = 200                           # Proximity margin in px
//!
//! [processing]
//! max_processes = 4                           # Omit for auto = CPU cores
//! ```
//!
//! Paths are relative to the project root. Unknown keys are rejected to catch
//! typos early.

use crate::imaging::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the project root.
pub const CONFIG_FILENAME: &str = "lookbook.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete pipeline configuration loaded from `lookbook.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub images: ImagesConfig,
    pub placeholder: PlaceholderSettings,
    pub resolver: ResolverConfig,
    pub display: DisplayConfig,
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.sizes.is_empty() {
            return Err(ConfigError::Validation(
                "images.sizes must not be empty".into(),
            ));
        }
        if self.images.sizes.contains(&0) {
            return Err(ConfigError::Validation(
                "images.sizes values must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.placeholder.width == 0 {
            return Err(ConfigError::Validation(
                "placeholder.width must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.placeholder.quality) {
            return Err(ConfigError::Validation(
                "placeholder.quality must be 1-100".into(),
            ));
        }
        if self.display.root_margin > MAX_ROOT_MARGIN {
            return Err(ConfigError::Validation(format!(
                "display.root_margin must be 0-{MAX_ROOT_MARGIN}"
            )));
        }
        if self.paths.public_url.is_empty() {
            return Err(ConfigError::Validation(
                "paths.public_url must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Ladder widths sorted ascending with duplicates removed.
    pub fn ladder(&self) -> Vec<u32> {
        let mut sizes = self.images.sizes.clone();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }
}

const MAX_ROOT_MARGIN: u32 = 1000;

/// Filesystem locations, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory scanned recursively for source images.
    pub input_dir: PathBuf,
    /// Directory derivatives are written into (one subdirectory per identifier).
    pub output_dir: PathBuf,
    /// Where the manifest JSON is written.
    pub manifest_path: PathBuf,
    /// Public URL prefix that `output_dir` is served under.
    pub public_url: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("assets/images/original"),
            output_dir: PathBuf::from("public/images/optimized"),
            manifest_path: PathBuf::from("public/images/manifest.json"),
            public_url: "/images/optimized".to_string(),
        }
    }
}

impl PathsConfig {
    /// Join every path onto `root`. Absolute paths are kept as-is.
    pub fn resolve(&self, root: &Path) -> Self {
        Self {
            input_dir: root.join(&self.input_dir),
            output_dir: root.join(&self.output_dir),
            manifest_path: root.join(&self.manifest_path),
            public_url: self.public_url.clone(),
        }
    }
}

/// Derivative ladder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Target pixel widths. Never upscaled past the source width.
    pub sizes: Vec<u32>,
    /// Lossy encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Output codec for every derivative and the placeholder.
    pub format: OutputFormat,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            sizes: vec![320, 640, 1024, 2048],
            quality: 75,
            format: OutputFormat::WebP,
        }
    }
}

/// Blur-up placeholder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaceholderSettings {
    pub enabled: bool,
    pub width: u32,
    pub quality: u32,
}

impl Default for PlaceholderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 20,
            quality: 40,
        }
    }
}

/// Runtime resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Well-known URL the manifest is published at.
    pub manifest_url: String,
    /// Default `sizes` hint emitted alongside `srcset`.
    pub sizes: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            manifest_url: "/images/manifest.json".to_string(),
            sizes: "100vw".to_string(),
        }
    }
}

/// Deferred-loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// How close (in px) the container must get to the viewport before loading.
    pub root_margin: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { root_margin: 200 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(Config::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `lookbook.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `lookbook.toml` in the project root.
pub fn load_config(root: &Path) -> Result<Config, ConfigError> {
    resolve_config(load_raw_config(root)?)
}

/// Returns a fully-commented stock `lookbook.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Lookbook Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.
# Paths are relative to the project root.

# ---------------------------------------------------------------------------
# Locations
# ---------------------------------------------------------------------------
[paths]
# Source images, discovered recursively (jpg, jpeg, png, webp).
# A missing directory is not an error: the optimizer logs and exits cleanly.
input_dir = "assets/images/original"

# Derivatives are written to <output_dir>/<identifier>/<identifier>-<width>.<ext>
output_dir = "public/images/optimized"

# The manifest is rewritten wholesale on every run.
manifest_path = "public/images/manifest.json"

# URL prefix under which output_dir is served.
public_url = "/images/optimized"

# ---------------------------------------------------------------------------
# Derivative ladder
# ---------------------------------------------------------------------------
[images]
# Target widths. Sources narrower than a width are never upscaled.
sizes = [320, 640, 1024, 2048]

# Lossy encoding quality (1 = worst, 100 = best).
quality = 75

# "webp" or "avif".
format = "webp"

# ---------------------------------------------------------------------------
# Blur-up placeholder (inlined into the manifest as a data URI)
# ---------------------------------------------------------------------------
[placeholder]
enabled = true
width = 20
quality = 40

# ---------------------------------------------------------------------------
# Runtime resolver
# ---------------------------------------------------------------------------
[resolver]
# Well-known URL the manifest is published at.
manifest_url = "/images/manifest.json"

# Default sizes hint emitted with srcset.
sizes = "100vw"

# ---------------------------------------------------------------------------
# Deferred loading
# ---------------------------------------------------------------------------
[display]
# Start loading once the container is within this many pixels of the viewport.
root_margin = 200

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
