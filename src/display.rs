//! Deferred, progressive display of a resolved image.
//!
//! An [`ImageDisplay`] is a small state machine driven by two external event
//! sources, a visibility observer and an image decode notification:
//!
//! ```text
//! Idle ──visible / priority──▶ Loading ──decoded──▶ Loaded
//!                                 ▲                   │
//!                                 └────src changed────┘
//! ```
//!
//! Nothing leads back to `Idle`. The visibility subscription is one-shot and
//! released as soon as it fires. Every subscription is a [`Subscription`]
//! guard held by the display, so tearing the display down releases them all,
//! and callbacks only hold a weak reference: an event delivered after
//! teardown finds nothing to mutate.

use crate::resolver::ResolvedImage;
use maud::{Markup, html};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Load state of a display instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Waiting to come near the viewport. Only a placeholder is shown.
    Idle,
    /// Real image mounted, not decoded yet.
    Loading,
    /// Real image decoded.
    Loaded,
}

/// Presentation inputs that are not part of the resolved image.
#[derive(Debug, Clone)]
pub struct DisplayProps {
    pub alt: String,
    /// `sizes` attribute paired with `srcset`.
    pub sizes: String,
    /// Skip deferral (above-the-fold images).
    pub priority: bool,
    /// Proximity margin in pixels for the visibility observer.
    pub root_margin: u32,
}

impl Default for DisplayProps {
    fn default() -> Self {
        Self {
            alt: String::new(),
            sizes: "100vw".to_string(),
            priority: false,
            root_margin: 200,
        }
    }
}

/// Releases a registration when dropped.
#[must_use = "dropping a Subscription releases it immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Source of "container is near the viewport" events.
pub trait VisibilityObserver: Send + Sync {
    /// Call `on_visible` once the container is within `root_margin` px of the
    /// viewport. Dropping the returned guard stops observing.
    fn observe(&self, root_margin: u32, on_visible: Box<dyn FnOnce() + Send>) -> Subscription;
}

/// Source of "image finished decoding" events.
pub trait DecodeNotifier: Send + Sync {
    /// Call `on_decoded` once the image at `src` has decoded. May call it
    /// before returning if the image is already available.
    fn on_decoded(&self, src: &str, on_decoded: Box<dyn FnOnce() + Send>) -> Subscription;
}

struct DisplayInner {
    props: DisplayProps,
    image: ResolvedImage,
    state: LoadState,
    mounted: bool,
    /// Bumped whenever the source changes so stale decode events are ignored.
    generation: u64,
    visibility: Option<Subscription>,
    decode: Option<Subscription>,
}

/// One mounted image.
pub struct ImageDisplay {
    inner: Arc<Mutex<DisplayInner>>,
    decoder: Arc<dyn DecodeNotifier>,
}

impl ImageDisplay {
    /// Mount a display. Priority images start `Loading` immediately; all
    /// others start `Idle` and wait for the visibility observer.
    pub fn mount(
        props: DisplayProps,
        image: ResolvedImage,
        observer: &dyn VisibilityObserver,
        decoder: Arc<dyn DecodeNotifier>,
    ) -> Self {
        let priority = props.priority;
        let root_margin = props.root_margin;
        let inner = Arc::new(Mutex::new(DisplayInner {
            props,
            image,
            state: if priority {
                LoadState::Loading
            } else {
                LoadState::Idle
            },
            mounted: true,
            generation: 0,
            visibility: None,
            decode: None,
        }));

        if priority {
            arm_decode(&inner, &decoder);
        } else {
            let weak = Arc::downgrade(&inner);
            let callback_decoder = Arc::clone(&decoder);
            let subscription = observer.observe(
                root_margin,
                Box::new(move || on_visible(&weak, &callback_decoder)),
            );
            // The observer may have fired synchronously
            let spent = {
                let mut guard = inner.lock();
                if guard.state == LoadState::Idle {
                    guard.visibility = Some(subscription);
                    None
                } else {
                    Some(subscription)
                }
            };
            drop(spent);
        }

        Self { inner, decoder }
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// True while waiting on the visibility observer.
    pub fn is_observing(&self) -> bool {
        self.inner.lock().visibility.is_some()
    }

    pub fn image(&self) -> ResolvedImage {
        self.inner.lock().image.clone()
    }

    /// Point the display at a (possibly) different image.
    ///
    /// If the source changes after loading started, the display drops back
    /// to `Loading` with the loaded flag cleared and waits for the new
    /// decode. An `Idle` display stays `Idle`.
    pub fn set_image(&self, image: ResolvedImage) {
        let stale = {
            let mut inner = self.inner.lock();
            let changed = inner.image.smallest_url != image.smallest_url
                || inner.image.srcset != image.srcset;
            inner.image = image;
            if !changed || inner.state == LoadState::Idle {
                return;
            }
            inner.generation += 1;
            inner.state = LoadState::Loading;
            inner.decode.take()
        };
        drop(stale);
        arm_decode(&self.inner, &self.decoder);
    }

    /// Render the current state as HTML.
    pub fn render(&self) -> Markup {
        let inner = self.inner.lock();
        render_state(&inner.props, &inner.image, inner.state)
    }

    /// Tear down, releasing every subscription.
    pub fn unmount(self) {}

    fn teardown(&self) {
        let (visibility, decode) = {
            let mut inner = self.inner.lock();
            inner.mounted = false;
            (inner.visibility.take(), inner.decode.take())
        };
        drop(visibility);
        drop(decode);
    }
}

impl Drop for ImageDisplay {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn on_visible(weak: &Weak<Mutex<DisplayInner>>, decoder: &Arc<dyn DecodeNotifier>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let spent = {
        let mut guard = inner.lock();
        if !guard.mounted || guard.state != LoadState::Idle {
            return;
        }
        guard.state = LoadState::Loading;
        guard.visibility.take()
    };
    drop(spent);
    arm_decode(&inner, decoder);
}

fn on_decoded(weak: &Weak<Mutex<DisplayInner>>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let spent = {
        let mut guard = inner.lock();
        if !guard.mounted || guard.generation != generation || guard.state != LoadState::Loading {
            return;
        }
        guard.state = LoadState::Loaded;
        guard.decode.take()
    };
    drop(spent);
}

/// Subscribe to the decode of the current source.
///
/// Called without the lock held: the notifier may fire synchronously.
fn arm_decode(inner: &Arc<Mutex<DisplayInner>>, decoder: &Arc<dyn DecodeNotifier>) {
    let (src, generation) = {
        let guard = inner.lock();
        (guard.image.smallest_url.clone(), guard.generation)
    };
    let weak = Arc::downgrade(inner);
    let subscription = decoder.on_decoded(
        &src,
        Box::new(move || on_decoded(&weak, generation)),
    );

    let mut guard = inner.lock();
    let still_waiting = guard.mounted
        && guard.generation == generation
        && guard.state == LoadState::Loading;
    if still_waiting {
        guard.decode = Some(subscription);
    } else {
        drop(guard);
        drop(subscription);
    }
}

fn aspect_style(image: &ResolvedImage) -> Option<String> {
    match (image.intrinsic_width, image.intrinsic_height) {
        (Some(w), Some(h)) => Some(format!("aspect-ratio: {w} / {h};")),
        _ => None,
    }
}

/// Render a display state without a live instance.
pub fn render_state(props: &DisplayProps, image: &ResolvedImage, state: LoadState) -> Markup {
    let style = aspect_style(image);
    match state {
        LoadState::Idle => html! {
            @if let Some(placeholder) = &image.placeholder {
                img.image-placeholder.is-blurred
                    src=(placeholder)
                    alt=""
                    aria-hidden="true"
                    width=[image.intrinsic_width]
                    height=[image.intrinsic_height];
            } @else {
                div.image-placeholder aria-hidden="true" style=[style] {}
            }
        },
        LoadState::Loading | LoadState::Loaded => {
            let loaded = state == LoadState::Loaded;
            let sizes = image.srcset_attr().map(|_| props.sizes.as_str());
            html! {
                div.image-frame style=[style] {
                    @if let (Some(placeholder), false) = (&image.placeholder, loaded) {
                        img.image-placeholder.is-blurred
                            src=(placeholder)
                            alt=""
                            aria-hidden="true";
                    }
                    img.image.is-loaded[loaded]
                        src=(image.smallest_url)
                        srcset=[image.srcset_attr()]
                        sizes=[sizes]
                        alt=(props.alt)
                        width=[image.intrinsic_width]
                        height=[image.intrinsic_height]
                        loading=(if props.priority { "eager" } else { "lazy" })
                        decoding="async";
                }
            }
        }
    }
}
