// Pixel decoder: raw packed bitmap -> CanonicalImage.
//
// Rows are always addressed through the stride. A pixel whose source bytes
// fall outside the buffer decodes to transparent black (opaque black for
// BGRX32) and is counted in `CanonicalImage::fallback_pixels`.

use image::RgbaImage;
use tracing::warn;

use super::{CanonicalImage, PixelFormat, RawImageBuffer};
use crate::error::RecompressError;

const TRANSPARENT_BLACK: [u8; 4] = [0, 0, 0, 0];
const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// Decode a raw bitmap into an RGBA image.
///
/// # Errors
/// * `InvalidGeometryError` when either dimension is zero, or the stride is
///   shorter than `width * bytes_per_pixel`.
pub fn decode(buffer: &RawImageBuffer) -> crate::error::Result<CanonicalImage> {
    validate_geometry(buffer)?;

    let width = buffer.width as usize;
    let height = buffer.height as usize;
    let bpp = buffer.format.bytes_per_pixel();
    let data = buffer.data.as_slice();

    let mut out = Vec::with_capacity(width * height * 4);
    let mut fallback = 0usize;

    for row in 0..height {
        let row_start = row * buffer.stride;
        for x in 0..width {
            let index = row_start + x * bpp;
            let px = match buffer.format {
                PixelFormat::Gray8 => data.get(index).map(|&y| [y, y, y, 255]),
                PixelFormat::Bgr24 => {
                    (index + 2 < data.len()).then(|| [data[index + 2], data[index + 1], data[index], 255])
                }
                PixelFormat::Bgra32 => (index + 3 < data.len()).then(|| {
                    [data[index + 2], data[index + 1], data[index], data[index + 3]]
                }),
                PixelFormat::Bgrx32 => {
                    (index + 3 < data.len()).then(|| [data[index + 2], data[index + 1], data[index], 255])
                }
            };

            let px = px.unwrap_or_else(|| {
                fallback += 1;
                match buffer.format {
                    PixelFormat::Bgrx32 => OPAQUE_BLACK,
                    _ => TRANSPARENT_BLACK,
                }
            });
            out.extend_from_slice(&px);
        }
    }

    if fallback > 0 {
        warn!(
            format = buffer.format.name(),
            width = buffer.width,
            height = buffer.height,
            stride = buffer.stride,
            bytes = data.len(),
            fallback_pixels = fallback,
            "raw buffer shorter than stride x height, substituted out-of-bounds pixels"
        );
    }

    let pixels = RgbaImage::from_raw(buffer.width, buffer.height, out).ok_or_else(|| {
        RecompressError::invalid_geometry(format!(
            "cannot build {}x{} RGBA image",
            buffer.width, buffer.height
        ))
    })?;

    Ok(CanonicalImage::from_rgba(pixels).with_fallback_pixels(fallback))
}

fn validate_geometry(buffer: &RawImageBuffer) -> crate::error::Result<()> {
    if buffer.width == 0 || buffer.height == 0 {
        return Err(RecompressError::invalid_geometry(format!(
            "empty bitmap: {}x{}",
            buffer.width, buffer.height
        )));
    }

    let min_stride = (buffer.width as usize)
        .checked_mul(buffer.format.bytes_per_pixel())
        .ok_or_else(|| {
            RecompressError::invalid_geometry(format!("width overflow: {}", buffer.width))
        })?;

    if buffer.stride < min_stride {
        return Err(RecompressError::invalid_geometry(format!(
            "stride {} is shorter than width {} x {} bytes per pixel",
            buffer.stride,
            buffer.width,
            buffer.format.bytes_per_pixel()
        )));
    }

    let rows = (buffer.height as usize).checked_mul(buffer.stride);
    let rgba = (buffer.width as usize)
        .checked_mul(buffer.height as usize)
        .and_then(|n| n.checked_mul(4));
    rows.zip(rgba).ok_or_else(|| {
            RecompressError::invalid_geometry(format!(
                "bitmap size overflow: {}x{} stride {}",
                buffer.width, buffer.height, buffer.stride
            ))
        })?;

    Ok(())
}
