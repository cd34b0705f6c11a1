//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the transcoder
//! needs: identify, resize (to disk), and placeholder (to memory).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! [`MockBackend`](tests::MockBackend), which records operations and can be
//! scripted to fail individual widths or placeholders.

use super::params::{PlaceholderParams, ResizeParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Must be `Sync`: the transcoder shares one backend across rayon workers.
pub trait ImageBackend: Sync {
    /// Get image dimensions without a full decode where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode, resize to exactly `width`×`height`, encode and write `params.output`.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;

    /// Decode, shrink, and encode into an in-memory buffer.
    fn placeholder(&self, params: &PlaceholderParams) -> Result<Vec<u8>, BackendError>;
}
