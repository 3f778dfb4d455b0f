//! Display targets and the per-target binding state used for stale-result checks.
//!
//! A display target (a cell in a scrolling grid, a thumbnail widget) may be
//! recycled for a different image while an older load is still in flight.
//! Each target carries a [`BindingState`] recording the URI it currently
//! represents; only a result for that URI may change what the target shows.

use std::sync::Arc;

use parking_lot::RwLock;

use super::LoadedImage;

/// Callback invoked with the target and the loaded image (or `None` when no
/// image could be produced) instead of assigning the image directly.
pub type ImageCallback = Arc<dyn Fn(&dyn DisplayTarget, Option<LoadedImage>) + Send + Sync>;

/// The URI a display target currently represents.
///
/// Written at bind time and read at delivery time, both from the UI thread.
/// The lock only makes the type shareable with worker threads that hold a
/// weak handle to the target.
#[derive(Debug, Default)]
pub struct BindingState {
    current: RwLock<Option<String>>,
}

impl BindingState {
    /// Creates an unbound state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `uri` as the current binding, replacing any previous one.
    pub fn bind(&self, uri: &str) {
        *self.current.write() = Some(uri.to_owned());
    }

    /// Returns the currently bound URI.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Returns true if `uri` is the current binding.
    #[must_use]
    pub fn is_current(&self, uri: &str) -> bool {
        self.current.read().as_deref() == Some(uri)
    }

    /// Forgets the current binding.
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

/// A UI element that shows a decoded image.
pub trait DisplayTarget: Send + Sync {
    /// Binding state owned by this target.
    fn binding(&self) -> &BindingState;

    /// Shows `image`, or a placeholder when `None`.
    fn set_image(&self, image: Option<LoadedImage>);
}

/// Minimal display target holding the last image assigned to it.
#[derive(Debug, Default)]
pub struct ImageSlot {
    binding: BindingState,
    image: RwLock<Option<LoadedImage>>,
    updates: std::sync::atomic::AtomicUsize,
}

impl ImageSlot {
    /// Creates an empty, unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the image currently shown.
    #[must_use]
    pub fn image(&self) -> Option<LoadedImage> {
        self.image.read().clone()
    }

    /// Number of times content was assigned, placeholders included.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl DisplayTarget for ImageSlot {
    fn binding(&self) -> &BindingState {
        &self.binding
    }

    fn set_image(&self, image: Option<LoadedImage>) {
        *self.image.write() = image;
        self.updates
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CacheKey, ImageSource};

    #[test]
    fn test_last_bind_wins() {
        let state = BindingState::new();
        assert!(state.current().is_none());

        state.bind("https://example.com/a.png");
        state.bind("https://example.com/b.png");

        assert!(state.is_current("https://example.com/b.png"));
        assert!(!state.is_current("https://example.com/a.png"));

        state.clear();
        assert!(!state.is_current("https://example.com/b.png"));
    }

    #[test]
    fn test_slot_tracks_updates() {
        let slot = ImageSlot::new();
        assert!(slot.image().is_none());

        slot.set_image(Some(LoadedImage {
            key: CacheKey::from_uri("u"),
            image: Arc::new(image::DynamicImage::new_rgb8(3, 3)),
            source: ImageSource::MemoryCache,
        }));
        slot.set_image(None);

        assert!(slot.image().is_none());
        assert_eq!(slot.update_count(), 2);
    }
}
