//! Derivative rendering: thumbnails and WebP alternates.
//!
//! Both renderers are pure byte transforms over an already-decoded image.
//! They never touch the filesystem; the pipeline decides where the
//! encoded bytes land and runs these on blocking threads under the
//! concurrency limiter.

use crate::ingest::error::IngestError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Decode an upload payload into a pixel buffer.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, IngestError> {
    image::load_from_memory(bytes).map_err(|e| IngestError::Decode(e.to_string()))
}

/// Render a thumbnail no wider than `max_width`, encoded in the same
/// format as the original.
///
/// Aspect ratio is preserved. Images already at or below the target
/// width are re-encoded without resizing, so the thumbnail location is
/// always populated for a successful render. JPEG output honors
/// `jpeg_quality`; other formats use the encoder defaults.
pub fn render_thumbnail(
    source: &DynamicImage,
    format: ImageFormat,
    max_width: u32,
    jpeg_quality: u8,
) -> Result<Vec<u8>, IngestError> {
    let derivative_err = |reason: String| IngestError::Derivative {
        kind: "thumbnail",
        reason,
    };

    let resized = if source.width() > max_width {
        source.resize(max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        source.clone()
    };

    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            resized
                .write_with_encoder(encoder)
                .map_err(|e| derivative_err(e.to_string()))?;
        }
        ImageFormat::WebP => {
            // The WebP encoder only accepts 8-bit RGB/RGBA buffers.
            let encoder = WebPEncoder::new_lossless(&mut buf);
            DynamicImage::ImageRgba8(resized.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(|e| derivative_err(e.to_string()))?;
        }
        other => {
            resized
                .write_to(&mut buf, other)
                .map_err(|e| derivative_err(e.to_string()))?;
        }
    }
    Ok(buf.into_inner())
}

/// Render the full-size lossless WebP alternate encoding.
pub fn render_webp(source: &DynamicImage) -> Result<Vec<u8>, IngestError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = WebPEncoder::new_lossless(&mut buf);
    DynamicImage::ImageRgba8(source.to_rgba8())
        .write_with_encoder(encoder)
        .map_err(|e| IngestError::Derivative {
            kind: "webp",
            reason: e.to_string(),
        })?;
    Ok(buf.into_inner())
}
