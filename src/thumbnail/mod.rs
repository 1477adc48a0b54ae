//! Thumbnail rendering and the cached upload height floor.

mod engine;
mod height_cache;

pub use engine::{
    scaled_width, ImageProbe, RenderedThumbnail, ThumbnailEngine, THUMBNAIL_JPEG_QUALITY,
};
pub use height_cache::{MaxHeightCache, DEFAULT_MAX_HEIGHT_TTL_SECS};
