//! The image manifest: identifier → derivatives + placeholder.
//!
//! Written by the transcoder once per run, read by the resolver at runtime.
//! The on-disk shape is a single JSON object:
//!
//! ```json
//! {
//!   "Evening-Gown": {
//!     "src": "/images/optimized/Evening-Gown/Evening-Gown-2048.webp",
//!     "variants": [
//!       { "width": 320, "url": "/images/optimized/Evening-Gown/Evening-Gown-320.webp" },
//!       { "width": 1800, "url": "/images/optimized/Evening-Gown/Evening-Gown-2048.webp" }
//!     ],
//!     "placeholder": "data:image/webp;base64,...",
//!     "width": 1800,
//!     "height": 1200
//!   }
//! }
//! ```
//!
//! An identifier whose derivatives all failed is still present, with
//! `src`/`width` null and an empty `variants` list, so readers can tell it
//! apart from an identifier that was never processed.
//!
//! ## Parsing
//!
//! [`Manifest::parse`] only requires the document to be a JSON object. Each
//! entry is coalesced field by field: fields with the wrong type become
//! `null`, malformed variants are dropped, and entries that are not objects
//! are skipped with a warning. Call sites then work with a fully typed
//! [`ManifestEntry`] instead of re-checking shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Manifest must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One derivative as published: its pixel width and URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub width: u32,
    pub url: String,
}

/// Everything published for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// URL of the largest derivative, `None` if every width failed.
    pub src: Option<String>,
    /// Produced derivatives, ascending by width when written by the transcoder.
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Blur-up placeholder as a `data:` URI.
    pub placeholder: Option<String>,
    /// Pixel width of the largest derivative.
    pub width: Option<u32>,
    /// Pixel height of the largest derivative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ManifestEntry {
    /// Build an entry from the derivatives that were produced.
    ///
    /// `variants` may be in any order; `src`, `width` and `height` come from
    /// the widest one.
    pub fn from_variants(
        mut variants: Vec<(Variant, u32)>,
        placeholder: Option<String>,
    ) -> Self {
        variants.sort_by_key(|(v, _)| v.width);
        let largest = variants.last().cloned();
        Self {
            src: largest.as_ref().map(|(v, _)| v.url.clone()),
            width: largest.as_ref().map(|(v, _)| v.width),
            height: largest.map(|(_, h)| h),
            variants: variants.into_iter().map(|(v, _)| v).collect(),
            placeholder,
        }
    }

    /// True when nothing usable was produced for this identifier.
    pub fn is_empty(&self) -> bool {
        self.src.is_none() && self.variants.is_empty()
    }

    /// Variants ascending by width, one per width.
    pub fn sorted_variants(&self) -> Vec<&Variant> {
        let mut sorted: Vec<&Variant> = self.variants.iter().collect();
        sorted.sort_by_key(|v| v.width);
        sorted.dedup_by_key(|v| v.width);
        sorted
    }

    /// Coalesce an arbitrary JSON value into an entry.
    ///
    /// Returns `None` only if `value` is not an object.
    fn coalesce(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let string = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        let dimension = |key: &str| obj.get(key).and_then(pixel_count);
        let variants = obj
            .get("variants")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(coalesce_variant).collect())
            .unwrap_or_default();

        Some(Self {
            src: string("src"),
            variants,
            placeholder: string("placeholder"),
            width: dimension("width"),
            height: dimension("height"),
        })
    }
}

/// A positive pixel count. Integral floats such as `1024.0` are accepted.
fn pixel_count(value: &Value) -> Option<u32> {
    let n = match value.as_u64() {
        Some(n) => n,
        None => {
            let f = value.as_f64()?;
            if f.fract() != 0.0 || f < 1.0 || f > u32::MAX as f64 {
                return None;
            }
            f as u64
        }
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

fn coalesce_variant(value: &Value) -> Option<Variant> {
    let width = value.get("width").and_then(pixel_count)?;
    let url = value.get("url").and_then(Value::as_str)?;
    Some(Variant {
        width,
        url: url.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Full identifier → entry mapping. Keys are kept sorted so output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: String, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(identifier, entry)
    }

    pub fn get(&self, identifier: &str) -> Option<&ManifestEntry> {
        self.entries.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse manifest JSON, coalescing malformed entries (see module docs).
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(map) = value else {
            return Err(ManifestError::NotAnObject(json_kind(&value)));
        };

        let mut manifest = Self::new();
        for (identifier, raw) in &map {
            match ManifestEntry::coalesce(raw) {
                Some(entry) => {
                    manifest.insert(identifier.clone(), entry);
                }
                None => tracing::warn!(
                    identifier = %identifier,
                    "Skipping manifest entry: expected an object, found {}",
                    json_kind(raw)
                ),
            }
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest so readers only ever see a complete file.
    ///
    /// Parent directories are created. The JSON goes to a sibling temp file
    /// that is then renamed over `path`.
    pub fn write_atomic(&self, path: &Path) -> Result<(), ManifestError> {
        let json = self.to_json_pretty()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest.json".into());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}
