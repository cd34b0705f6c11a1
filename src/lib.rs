//! # Lookbook
//!
//! The image-delivery pipeline behind a dress-rental storefront's catalog.
//! Product photos go in as large originals; what comes out is a ladder of
//! web-sized derivatives per photo, a blur-up placeholder, and a manifest the
//! storefront reads at runtime to build `srcset`s.
//!
//! # Architecture: Build Time and Run Time
//!
//! ```text
//! build:    assets/images/original/  →  optimize  →  public/images/optimized/<id>/<id>-<w>.webp
//!                                                  →  public/images/manifest.json
//!
//! runtime:  identifier  →  Resolver (manifest fetched once)  →  ResolvedImage
//!                       →  ImageDisplay (Idle → Loading → Loaded)  →  <img srcset sizes>
//! ```
//!
//! The manifest is the only contract between the two halves. It is a plain
//! JSON object keyed by identifier, so it can be served from the same static
//! host as the images and inspected by hand.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`optimize`] | Batch transcoder: discovery, per-image ladder + placeholder, manifest write |
//! | [`manifest`] | Manifest schema, lenient parsing, atomic write |
//! | [`resolver`] | Runtime lookup with a fetch-once manifest cache and deterministic fallbacks |
//! | [`display`] | Deferred/progressive display state machine and its HTML rendering (Maud) |
//! | [`imaging`] | Pure-Rust decode/resize with libwebp and rav1e encoders |
//! | [`config`] | `lookbook.toml` loading, validation, merging, stock config |
//! | [`naming`] | Identifier normalization and URL/file naming |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Degrade, Don't Fail
//!
//! Outside of the two fatal cases (an output directory that cannot be created
//! and a manifest that cannot be written) nothing aborts a run. A width that
//! fails to encode is left out of the entry; a placeholder that fails is left
//! `null`; an unreadable original still gets an entry, with nulls. On the
//! runtime side a missing manifest or entry resolves to a guessed URL instead
//! of an error, and [`resolver::Resolution`] says which case applied.
//!
//! ## Never Upscale
//!
//! The ladder is a list of target widths. A source narrower than a target gets
//! one derivative at its native width (still named by the target) and nothing
//! above that. See [`imaging::calculate_ladder`].
//!
//! ## One Manifest Write
//!
//! All entries are computed in memory and the manifest is written once, via a
//! temp file and rename. Readers see the previous manifest or the new one,
//! never a partial file. Each run replaces the manifest wholesale.
//!
//! ## Explicit Subscriptions
//!
//! The display's visibility and decode hooks return [`display::Subscription`]
//! guards. The display owns them and drops them on teardown, and callbacks hold
//! only weak references, so late events cannot touch a torn-down display.

pub mod config;
pub mod display;
pub mod imaging;
pub mod manifest;
pub mod naming;
pub mod optimize;
pub mod output;
pub mod resolver;
