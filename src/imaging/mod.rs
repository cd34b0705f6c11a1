//! Image processing for the transcoder.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Resize → WebP** | Lanczos3 + libwebp lossy encoder |
//! | **Resize → AVIF** | Lanczos3 + rav1e encoder |
//! | **Placeholder** | tiny resize, encoded in memory, base64 data URI |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for ladder and placeholder dimensions (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{LadderStep, calculate_ladder, calculate_placeholder_dimensions};
pub use operations::{
    GeneratedVariant, LadderConfig, PlaceholderConfig, VariantOutcome, create_placeholder,
    create_variants, data_uri, get_dimensions,
};
pub use params::{OutputFormat, Quality};
pub use rust_backend::{RustBackend, supported_input_extensions};
