//! Thumbnail renderer.
//!
//! Decodes an uploaded image, resizes it to a target height and re-encodes it.
//!
//! # Design Decisions
//!
//! - **Aspect-preserving box**: the output is exactly `target_height` pixels tall;
//!   its width is `floor(source_width * target_height / source_height)` computed
//!   in integer arithmetic and clamped to at least 1.
//!
//! - **Deterministic**: a fixed resampling filter and fixed encoder settings mean
//!   identical inputs always produce identical bytes.
//!
//! - **Format**: JPEG sources produce JPEG thumbnails, PNG sources produce PNG.
//!   Anything else the decoder understands is written as PNG.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

use crate::error::RenderError;

/// JPEG quality used for thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Resampling filter used for every resize.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

// =============================================================================
// Types
// =============================================================================

/// Format and dimensions of an image, read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageProbe {
    /// File extension used when storing this image.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

/// Encoded thumbnail ready to be stored.
#[derive(Debug, Clone)]
pub struct RenderedThumbnail {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl RenderedThumbnail {
    /// File extension used when storing this thumbnail.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        _ => "bin",
    }
}

/// Width of a thumbnail of `target_height` for a `source_width` x `source_height` image.
#[inline]
pub fn scaled_width(source_width: u32, source_height: u32, target_height: u32) -> u32 {
    if source_height == 0 {
        return 1;
    }
    let width = u64::from(source_width) * u64::from(target_height) / u64::from(source_height);
    u32::try_from(width).unwrap_or(u32::MAX).max(1)
}

// =============================================================================
// Thumbnail Engine
// =============================================================================

/// Stateless decode, resize and encode pipeline.
///
/// Cheap to clone; rendering is CPU-bound and is run on the blocking pool by
/// the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ThumbnailEngine {}

impl ThumbnailEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// Read format and dimensions without decoding pixel data.
    pub fn probe(&self, source: &[u8]) -> Result<ImageProbe, RenderError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| RenderError::Decode {
                message: e.to_string(),
            })?;

        let format = reader.format().ok_or_else(|| RenderError::Decode {
            message: "unrecognized image format".to_string(),
        })?;

        let (width, height) = reader.into_dimensions().map_err(|e| RenderError::Decode {
            message: e.to_string(),
        })?;

        if width == 0 || height == 0 {
            return Err(RenderError::Decode {
                message: format!("image has empty dimensions {}x{}", width, height),
            });
        }

        Ok(ImageProbe {
            format,
            width,
            height,
        })
    }

    /// Produce a thumbnail `target_height` pixels tall.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Decode`] if `source` is not a readable image and
    /// [`RenderError::Encode`] if the resized image cannot be written.
    pub fn render(
        &self,
        source: &[u8],
        source_width: u32,
        source_height: u32,
        target_height: u32,
    ) -> Result<RenderedThumbnail, RenderError> {
        if source_height == 0 || target_height == 0 {
            return Err(RenderError::Decode {
                message: format!(
                    "cannot scale height {} to {}",
                    source_height, target_height
                ),
            });
        }

        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| RenderError::Decode {
                message: e.to_string(),
            })?;
        let source_format = reader.format();

        let img = reader.decode().map_err(|e| RenderError::Decode {
            message: e.to_string(),
        })?;

        let target_width = scaled_width(source_width, source_height, target_height);
        let resized = img.resize_exact(target_width, target_height, RESIZE_FILTER);

        let format = match source_format {
            Some(ImageFormat::Jpeg) => ImageFormat::Jpeg,
            _ => ImageFormat::Png,
        };

        let bytes = encode(&resized, format)?;

        Ok(RenderedThumbnail {
            bytes,
            width: resized.width(),
            height: resized.height(),
            format,
        })
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Bytes, RenderError> {
    let mut output = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let mut encoder = JpegEncoder::new_with_quality(&mut output, THUMBNAIL_JPEG_QUALITY);
            encoder
                .encode_image(&rgb)
                .map_err(|e| RenderError::Encode {
                    message: e.to_string(),
                })?;
        }
        _ => {
            img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| RenderError::Encode {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(Bytes::from(output))
}

// =============================================================================
// Tests
// =============================================================================
