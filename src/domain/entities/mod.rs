//! Domain entity definitions.

mod binding;
mod cache_key;
mod image;

pub use binding::{BindingState, DisplayTarget, ImageCallback, ImageSlot};
pub use cache_key::{CacheKey, DIGEST_KEY_LEN, KeyHasher};
pub use self::image::{ImageSource, LoadedImage};
