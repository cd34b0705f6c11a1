//! Runtime lookup of published images.
//!
//! Turns an identifier into the URLs and sizing hints a display surface
//! needs. The manifest is fetched lazily, at most once per [`ManifestCache`],
//! and shared by every lookup after that.
//!
//! ## Cache states
//!
//! ```text
//! NotRequested ──first get_manifest()──▶ Pending ──ok──▶ Loaded
//!                                           │
//!                                           └──error──▶ Failed
//! ```
//!
//! Callers that arrive while the fetch is `Pending` await the same shared
//! future. `Loaded` and `Failed` are terminal: a failed fetch is never retried.
//!
//! ## Degradation
//!
//! | Situation | [`Resolution`] | Result |
//! |---|---|---|
//! | Entry with variants | `Manifest` | ascending srcset, smallest variant as `src` |
//! | Entry with only `src` | `Manifest` | `src` as the single srcset member |
//! | Entry with nothing produced | `EmptyEntry` | guessed URL, placeholder kept |
//! | Identifier not in manifest | `MissingEntry` | guessed URL |
//! | Manifest unavailable | `NoManifest` | guessed URL |
//!
//! The guessed URL is `<public_url>/<identifier>.<ext>`. Lookups never fail.

use crate::config::Config;
use crate::imaging::OutputFormat;
use crate::manifest::{Manifest, ManifestEntry, ManifestError};
use crate::naming::fallback_url;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Manifest request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid manifest: {0}")]
    Manifest(#[from] ManifestError),
}

/// Where the manifest comes from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Fetch the raw manifest body.
    async fn fetch(&self) -> Result<String, FetchError>;
}

/// Manifest published over HTTP.
pub struct HttpManifestSource {
    url: String,
    client: reqwest::Client,
}

impl HttpManifestSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    fn location(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<String, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Manifest read from the local filesystem.
pub struct FileManifestSource {
    path: PathBuf,
}

impl FileManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<String, FetchError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Pick a source for `location`: `http(s)://` URLs go over the network,
/// anything else is a file path.
pub fn source_for(location: &str) -> Arc<dyn ManifestSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpManifestSource::new(location))
    } else {
        Arc::new(FileManifestSource::new(location))
    }
}

type ManifestFuture = Shared<BoxFuture<'static, Option<Arc<Manifest>>>>;

enum CacheState {
    NotRequested,
    Pending(ManifestFuture),
    Loaded(Arc<Manifest>),
    Failed,
}

/// Observable cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    NotRequested,
    Pending,
    Loaded,
    Failed,
}

/// Lazily-fetched, write-once manifest.
pub struct ManifestCache {
    source: Arc<dyn ManifestSource>,
    state: Arc<Mutex<CacheState>>,
    fetches: AtomicUsize,
}

impl ManifestCache {
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::NotRequested)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> CacheStatus {
        match &*self.state.lock() {
            CacheState::NotRequested => CacheStatus::NotRequested,
            CacheState::Pending(_) => CacheStatus::Pending,
            CacheState::Loaded(_) => CacheStatus::Loaded,
            CacheState::Failed => CacheStatus::Failed,
        }
    }

    /// Number of fetches started. Never exceeds one.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// The manifest, or `None` if it could not be fetched or parsed.
    ///
    /// The first call starts the fetch; concurrent callers share it.
    pub async fn get_manifest(&self) -> Option<Arc<Manifest>> {
        let pending = {
            let mut state = self.state.lock();
            match &*state {
                CacheState::Loaded(manifest) => return Some(Arc::clone(manifest)),
                CacheState::Failed => return None,
                CacheState::Pending(fut) => fut.clone(),
                CacheState::NotRequested => {
                    let fut = self.start_fetch();
                    *state = CacheState::Pending(fut.clone());
                    fut
                }
            }
        };
        pending.await
    }

    fn start_fetch(&self) -> ManifestFuture {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        async move {
            let location = source.location();
            tracing::debug!(source = %location, "Fetching image manifest");
            let parsed = match source.fetch().await {
                Ok(body) => Manifest::parse(&body).map_err(FetchError::from),
                Err(e) => Err(e),
            };
            let loaded = match parsed {
                Ok(manifest) => {
                    tracing::debug!(
                        source = %location,
                        entries = manifest.len(),
                        "Manifest loaded"
                    );
                    Some(Arc::new(manifest))
                }
                Err(e) => {
                    tracing::warn!(
                        source = %location,
                        error = %e,
                        "Image manifest unavailable, using fallback URLs"
                    );
                    None
                }
            };
            *state.lock() = match &loaded {
                Some(manifest) => CacheState::Loaded(Arc::clone(manifest)),
                None => CacheState::Failed,
            };
            loaded
        }
        .boxed()
        .shared()
    }
}

/// Where a [`ResolvedImage`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Manifest,
    EmptyEntry,
    MissingEntry,
    NoManifest,
}

/// One `srcset` candidate. `width` is `None` when it is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate {
    pub url: String,
    pub width: Option<u32>,
}

/// Everything a display surface needs for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub identifier: String,
    /// Default `src`: the smallest variant, or the guessed URL.
    pub smallest_url: String,
    /// Ascending by width.
    pub srcset: Vec<SrcsetCandidate>,
    pub intrinsic_width: Option<u32>,
    pub intrinsic_height: Option<u32>,
    pub placeholder: Option<String>,
    pub resolution: Resolution,
}

impl ResolvedImage {
    fn fallback(identifier: &str, url: String, resolution: Resolution) -> Self {
        Self {
            identifier: identifier.to_string(),
            smallest_url: url,
            srcset: Vec::new(),
            intrinsic_width: None,
            intrinsic_height: None,
            placeholder: None,
            resolution,
        }
    }

    /// True when the URL was guessed rather than read from the manifest.
    pub fn is_fallback(&self) -> bool {
        self.resolution != Resolution::Manifest
    }

    /// The `srcset` attribute value, `None` when there are no candidates.
    pub fn srcset_attr(&self) -> Option<String> {
        if self.srcset.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .srcset
            .iter()
            .map(|c| match c.width {
                Some(w) => format!("{} {}w", c.url, w),
                None => c.url.clone(),
            })
            .collect();
        Some(parts.join(", "))
    }
}

fn resolve_entry(identifier: &str, entry: &ManifestEntry, fallback: String) -> ResolvedImage {
    let sorted = entry.sorted_variants();
    if let (Some(smallest), Some(largest)) = (sorted.first(), sorted.last()) {
        return ResolvedImage {
            identifier: identifier.to_string(),
            smallest_url: smallest.url.clone(),
            srcset: sorted
                .iter()
                .map(|v| SrcsetCandidate {
                    url: v.url.clone(),
                    width: Some(v.width),
                })
                .collect(),
            intrinsic_width: entry.width.or(Some(largest.width)),
            intrinsic_height: entry.height,
            placeholder: entry.placeholder.clone(),
            resolution: Resolution::Manifest,
        };
    }

    match &entry.src {
        Some(src) => ResolvedImage {
            identifier: identifier.to_string(),
            smallest_url: src.clone(),
            srcset: vec![SrcsetCandidate {
                url: src.clone(),
                width: entry.width,
            }],
            intrinsic_width: entry.width,
            intrinsic_height: entry.height,
            placeholder: entry.placeholder.clone(),
            resolution: Resolution::Manifest,
        },
        None => ResolvedImage {
            placeholder: entry.placeholder.clone(),
            ..ResolvedImage::fallback(identifier, fallback, Resolution::EmptyEntry)
        },
    }
}

/// Resolve against an already-loaded manifest (or none). Pure.
pub fn resolve_with(
    manifest: Option<&Manifest>,
    identifier: &str,
    fallback: String,
) -> ResolvedImage {
    let Some(manifest) = manifest else {
        return ResolvedImage::fallback(identifier, fallback, Resolution::NoManifest);
    };
    match manifest.get(identifier) {
        Some(entry) => resolve_entry(identifier, entry, fallback),
        None => {
            tracing::debug!(identifier, "No manifest entry, using fallback URL");
            ResolvedImage::fallback(identifier, fallback, Resolution::MissingEntry)
        }
    }
}

/// Identifier → [`ResolvedImage`], backed by a [`ManifestCache`].
pub struct Resolver {
    cache: ManifestCache,
    public_url: String,
    fallback_extension: &'static str,
    sizes: String,
}

impl Resolver {
    pub fn new(source: Arc<dyn ManifestSource>, public_url: impl Into<String>) -> Self {
        Self {
            cache: ManifestCache::new(source),
            public_url: public_url.into(),
            fallback_extension: OutputFormat::default().extension(),
            sizes: "100vw".to_string(),
        }
    }

    /// Resolver for the URLs and format a project's config publishes.
    pub fn from_config(config: &Config, source: Arc<dyn ManifestSource>) -> Self {
        Self {
            cache: ManifestCache::new(source),
            public_url: config.paths.public_url.clone(),
            fallback_extension: config.images.format.extension(),
            sizes: config.resolver.sizes.clone(),
        }
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    /// Default `sizes` hint to pair with `srcset`.
    pub fn sizes(&self) -> &str {
        &self.sizes
    }

    pub fn fallback_url(&self, identifier: &str) -> String {
        fallback_url(&self.public_url, identifier, self.fallback_extension)
    }

    pub async fn resolve(&self, identifier: &str) -> ResolvedImage {
        let manifest = self.cache.get_manifest().await;
        resolve_with(manifest.as_deref(), identifier, self.fallback_url(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tokio::sync::Notify;

    const MANIFEST: &str = r#"{
        "Evening-Gown": {
            "src": "/images/optimized/Evening-Gown/Evening-Gown-2048.webp",
            "variants": [
                {"width": 1024, "url": "/images/optimized/Evening-Gown/Evening-Gown-1024.webp"},
                {"width": 320, "url": "/images/optimized/Evening-Gown/Evening-Gown-320.webp"},
                {"width": 1800, "url": "/images/optimized/Evening-Gown/Evening-Gown-2048.webp"},
                {"width": 640, "url": "/images/optimized/Evening-Gown/Evening-Gown-640.webp"}
            ],
            "placeholder": "data:image/webp;base64,AA==",
            "width": 1800,
            "height": 1200
        },
        "src-only": {"src": "/legacy/src-only.jpg", "variants": [], "placeholder": null, "width": 900},
        "failed": {"src": null, "variants": [], "placeholder": "data:image/webp;base64,BB==", "width": null}
    }"#;

    /// Source that counts fetches and can hold them until released.
    struct GatedSource {
        body: Result<String, u16>,
        gate: Option<Arc<Notify>>,
        fetches: AtomicUsize,
    }

    impl GatedSource {
        fn ok(body: &str) -> Self {
            Self {
                body: Ok(body.to_string()),
                gate: None,
                fetches: AtomicUsize::new(0),
            }
        }

        fn status(code: u16) -> Self {
            Self {
                body: Err(code),
                gate: None,
                fetches: AtomicUsize::new(0),
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ManifestSource for GatedSource {
        fn location(&self) -> String {
            "mock://manifest.json".to_string()
        }

        async fn fetch(&self) -> Result<String, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.body {
                Ok(body) => Ok(body.clone()),
                Err(code) => Err(FetchError::Status {
                    url: self.location(),
                    status: *code,
                }),
            }
        }
    }

    fn resolver_with(source: Arc<GatedSource>) -> Resolver {
        Resolver::new(source, "/images/optimized")
    }

    // =========================================================================
    // Cache
    // =========================================================================

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(GatedSource::ok(MANIFEST).gated(Arc::clone(&gate)));
        let resolver = resolver_with(Arc::clone(&source));
        assert_eq!(resolver.cache().status(), CacheStatus::NotRequested);

        let lookups = join_all((0..16).map(|i| {
            let id = if i % 2 == 0 { "Evening-Gown" } else { "unknown" };
            resolver.resolve(id)
        }));
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(resolver.cache().status(), CacheStatus::Pending);
            gate.notify_one();
        };
        let (results, ()) = tokio::join!(lookups, release);

        assert_eq!(results.len(), 16);
        assert_eq!(source.fetches(), 1);
        assert_eq!(resolver.cache().fetch_count(), 1);
        assert_eq!(resolver.cache().status(), CacheStatus::Loaded);
        assert_eq!(results[0].resolution, Resolution::Manifest);
        assert_eq!(results[1].resolution, Resolution::MissingEntry);
    }

    #[tokio::test]
    async fn loaded_manifest_is_reused() {
        let source = Arc::new(GatedSource::ok(MANIFEST));
        let cache = ManifestCache::new(source.clone());

        let first = cache.get_manifest().await.unwrap();
        let second = cache.get_manifest().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn server_error_falls_back_without_retry() {
        let source = Arc::new(GatedSource::status(500));
        let resolver = resolver_with(Arc::clone(&source));

        for _ in 0..3 {
            let resolved = resolver.resolve("Evening-Gown").await;
            assert_eq!(resolved.smallest_url, "/images/optimized/Evening-Gown.webp");
            assert!(resolved.srcset.is_empty());
            assert_eq!(resolved.placeholder, None);
            assert_eq!(resolved.resolution, Resolution::NoManifest);
        }
        assert_eq!(source.fetches(), 1);
        assert_eq!(resolver.cache().status(), CacheStatus::Failed);
    }

    #[tokio::test]
    async fn malformed_json_counts_as_no_manifest() {
        let source = Arc::new(GatedSource::ok("{\"Evening-Gown\": [truncated"));
        let resolver = resolver_with(Arc::clone(&source));

        let resolved = resolver.resolve("Evening-Gown").await;

        assert_eq!(resolved.resolution, Resolution::NoManifest);
        assert_eq!(resolver.cache().status(), CacheStatus::Failed);
    }

    #[tokio::test]
    async fn non_object_manifest_counts_as_no_manifest() {
        let source = Arc::new(GatedSource::ok("[]"));
        let resolver = resolver_with(source);
        assert!(resolver.resolve("gown").await.is_fallback());
        assert_eq!(resolver.cache().status(), CacheStatus::Failed);
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[tokio::test]
    async fn resolves_sorted_srcset() {
        let resolver = resolver_with(Arc::new(GatedSource::ok(MANIFEST)));

        let resolved = resolver.resolve("Evening-Gown").await;

        let widths: Vec<Option<u32>> = resolved.srcset.iter().map(|c| c.width).collect();
        assert_eq!(widths, vec![Some(320), Some(640), Some(1024), Some(1800)]);
        assert_eq!(
            resolved.smallest_url,
            "/images/optimized/Evening-Gown/Evening-Gown-320.webp"
        );
        assert_eq!(resolved.intrinsic_width, Some(1800));
        assert_eq!(resolved.intrinsic_height, Some(1200));
        assert_eq!(
            resolved.placeholder.as_deref(),
            Some("data:image/webp;base64,AA==")
        );
        assert!(!resolved.is_fallback());
    }

    #[tokio::test]
    async fn missing_entry_fallback_is_deterministic() {
        let source = Arc::new(GatedSource::ok(MANIFEST));
        let resolver = resolver_with(Arc::clone(&source));

        let first = resolver.resolve("Silk Slip").await;
        let second = resolver.resolve("Silk Slip").await;

        assert_eq!(first, second);
        assert_eq!(first.smallest_url, "/images/optimized/Silk Slip.webp");
        assert_eq!(first.resolution, Resolution::MissingEntry);
        assert_eq!(source.fetches(), 1);

        // Other identifiers still resolve from the manifest
        let gown = resolver.resolve("Evening-Gown").await;
        assert_eq!(gown.resolution, Resolution::Manifest);
    }

    #[tokio::test]
    async fn src_only_entry_is_single_candidate() {
        let resolver = resolver_with(Arc::new(GatedSource::ok(MANIFEST)));

        let resolved = resolver.resolve("src-only").await;

        assert_eq!(resolved.smallest_url, "/legacy/src-only.jpg");
        assert_eq!(
            resolved.srcset,
            vec![SrcsetCandidate {
                url: "/legacy/src-only.jpg".into(),
                width: Some(900),
            }]
        );
        assert_eq!(resolved.resolution, Resolution::Manifest);
    }

    #[tokio::test]
    async fn empty_entry_keeps_placeholder() {
        let resolver = resolver_with(Arc::new(GatedSource::ok(MANIFEST)));

        let resolved = resolver.resolve("failed").await;

        assert_eq!(resolved.resolution, Resolution::EmptyEntry);
        assert_eq!(resolved.smallest_url, "/images/optimized/failed.webp");
        assert!(resolved.srcset.is_empty());
        assert_eq!(
            resolved.placeholder.as_deref(),
            Some("data:image/webp;base64,BB==")
        );
    }

    #[test]
    fn resolve_with_dedups_widths() {
        let manifest = Manifest::parse(
            r#"{"gown": {"variants": [
                {"width": 640, "url": "/b.webp"},
                {"width": 320, "url": "/a.webp"},
                {"width": 640, "url": "/c.webp"}
            ]}}"#,
        )
        .unwrap();

        let resolved = resolve_with(Some(&manifest), "gown", "/fallback.webp".into());

        assert_eq!(resolved.srcset.len(), 2);
        assert_eq!(resolved.intrinsic_width, Some(640));
        assert_eq!(resolved.srcset_attr().as_deref(), Some("/a.webp 320w, /b.webp 640w"));
    }

    #[test]
    fn srcset_attr_without_width_descriptor() {
        let resolved = ResolvedImage {
            srcset: vec![SrcsetCandidate {
                url: "/legacy.jpg".into(),
                width: None,
            }],
            ..ResolvedImage::fallback("legacy", "/legacy.jpg".into(), Resolution::Manifest)
        };
        assert_eq!(resolved.srcset_attr().as_deref(), Some("/legacy.jpg"));
    }

    #[test]
    fn fallback_has_no_srcset_attr() {
        let resolved = resolve_with(None, "gown", "/images/optimized/gown.webp".into());
        assert_eq!(resolved.srcset_attr(), None);
        assert_eq!(resolved.resolution, Resolution::NoManifest);
    }

    #[test]
    fn from_config_uses_format_and_sizes() {
        let mut config = Config::default();
        config.images.format = OutputFormat::Avif;
        config.paths.public_url = "/cdn/looks".into();
        config.resolver.sizes = "(min-width: 768px) 50vw, 100vw".into();

        let resolver = Resolver::from_config(&config, Arc::new(GatedSource::ok("{}")));

        assert_eq!(resolver.fallback_url("gown"), "/cdn/looks/gown.avif");
        assert_eq!(resolver.sizes(), "(min-width: 768px) 50vw, 100vw");
    }

    // =========================================================================
    // Sources
    // =========================================================================

    #[tokio::test]
    async fn file_source_reads_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        std::fs::write(&path, MANIFEST).unwrap();

        let resolver = Resolver::new(source_for(&path.to_string_lossy()), "/images/optimized");
        let resolved = resolver.resolve("Evening-Gown").await;

        assert_eq!(resolved.srcset.len(), 4);
    }

    #[tokio::test]
    async fn missing_file_is_no_manifest() {
        let resolver = Resolver::new(
            Arc::new(FileManifestSource::new("/nonexistent/manifest.json")),
            "/images/optimized",
        );
        let resolved = resolver.resolve("gown").await;
        assert_eq!(resolved.resolution, Resolution::NoManifest);
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/images/manifest.json")
    }

    #[tokio::test]
    async fn http_500_is_status_error() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let result = HttpManifestSource::new(url).fetch().await;

        assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn http_source_returns_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        )
        .await;

        let resolver = Resolver::new(source_for(&url), "/images/optimized");
        let resolved = resolver.resolve("gown").await;

        assert_eq!(resolver.cache().status(), CacheStatus::Loaded);
        assert_eq!(resolved.resolution, Resolution::MissingEntry);
    }
}
