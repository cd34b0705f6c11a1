//! Logical identifiers for source images.
//!
//! Every source image is keyed in the manifest (and namespaced on disk) by an
//! identifier derived from its filename stem. Identifiers end up in URLs, so
//! whitespace is collapsed to single hyphens:
//!
//! - `Evening Gown.jpg` → `Evening-Gown`
//! - `  red   silk dress .png` → `red-silk-dress`
//! - `navy-midi.webp` → `navy-midi` (unchanged)
//!
//! Case and non-whitespace punctuation are preserved, so the identifier still
//! reads like the file it came from.

use std::path::Path;

/// Normalize a filename stem into a URL-safe identifier.
///
/// Leading and trailing whitespace is dropped and every interior whitespace
/// run becomes a single `-`. Returns `None` when nothing is left, or when only
/// dots are left: `.` and `..` would escape the identifier's directory.
pub fn identifier_from_stem(stem: &str) -> Option<String> {
    let id = stem.split_whitespace().collect::<Vec<_>>().join("-");
    if id.chars().all(|c| c == '.') {
        None
    } else {
        Some(id)
    }
}

/// Identifier for a source image path (its file stem, normalized).
pub fn identifier_for_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy())
        .and_then(|stem| identifier_from_stem(&stem))
}

/// File name of one derivative: `<identifier>-<width>.<ext>`.
pub fn variant_file_name(identifier: &str, width: u32, extension: &str) -> String {
    format!("{identifier}-{width}.{extension}")
}

/// Join a public URL prefix and path segments with single slashes.
pub fn join_url(prefix: &str, segments: &[&str]) -> String {
    let mut url = prefix.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    url
}

/// Guessed URL for an identifier the manifest cannot describe:
/// `<public_url>/<identifier>.<ext>`.
pub fn fallback_url(public_url: &str, identifier: &str, extension: &str) -> String {
    join_url(public_url, &[&format!("{identifier}.{extension}")])
}
