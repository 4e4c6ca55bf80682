// Codec selection and serialization of a CanonicalImage.
//
// Transparent images go to PNG (alpha kept byte-for-byte), opaque images go
// to JPEG at the requested quality.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{GrayAlphaImage, GrayImage, LumaA, RgbImage};
use serde::{Deserialize, Serialize};

use super::CanonicalImage;
use crate::error::RecompressError;

/// Output codec class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCodec {
    /// PNG, alpha preserved.
    Lossless,
    /// JPEG, no alpha.
    Lossy,
}

impl OutputCodec {
    pub fn name(self) -> &'static str {
        match self {
            OutputCodec::Lossless => "lossless",
            OutputCodec::Lossy => "lossy",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputCodec::Lossless => "png",
            OutputCodec::Lossy => "jpg",
        }
    }
}

/// Encoded payload plus the parameters that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub codec: OutputCodec,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub grayscale: bool,
    /// Whether the payload carries an alpha channel (lossless only).
    pub has_alpha: bool,
    /// Pixels substituted while decoding the source buffer.
    pub fallback_pixels: usize,
}

/// Codec choice depends on nothing but the transparency flag.
pub fn select_codec(has_transparency: bool) -> OutputCodec {
    if has_transparency {
        OutputCodec::Lossless
    } else {
        OutputCodec::Lossy
    }
}

/// Encode `img` with the codec chosen by [`select_codec`].
pub fn encode(
    img: &CanonicalImage,
    quality: u8,
    force_gray: bool,
) -> crate::error::Result<EncodedOutput> {
    encode_as(img, select_codec(img.has_transparency()), quality, force_gray)
}

/// Encode `img` with an explicit codec.
///
/// # Errors
/// * `InvalidQualityError` when `quality` is outside 1-100.
pub fn encode_as(
    img: &CanonicalImage,
    codec: OutputCodec,
    quality: u8,
    force_gray: bool,
) -> crate::error::Result<EncodedOutput> {
    validate_quality(quality)?;

    let has_alpha = codec == OutputCodec::Lossless && img.has_transparency();
    let data = match (codec, force_gray) {
        (OutputCodec::Lossy, false) => encode_rgb_to_jpeg(&to_rgb(img), quality)?,
        (OutputCodec::Lossy, true) => encode_gray_to_jpeg(&to_luma(img), quality)?,
        (OutputCodec::Lossless, false) if has_alpha => write_png(img.pixels())?,
        (OutputCodec::Lossless, false) => write_png(&to_rgb(img))?,
        (OutputCodec::Lossless, true) if has_alpha => write_png(&to_luma_alpha(img))?,
        (OutputCodec::Lossless, true) => write_png(&to_luma(img))?,
    };

    Ok(EncodedOutput {
        codec,
        data,
        width: img.width(),
        height: img.height(),
        quality,
        grayscale: force_gray,
        has_alpha,
        fallback_pixels: img.fallback_pixels(),
    })
}

pub fn validate_quality(quality: u8) -> crate::error::Result<()> {
    if (1..=100).contains(&quality) {
        Ok(())
    } else {
        Err(RecompressError::invalid_quality(format!(
            "quality must be 1-100, got {quality}"
        )))
    }
}

/// `Y = (299 R + 587 G + 114 B) / 1000`
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

fn to_rgb(img: &CanonicalImage) -> RgbImage {
    let src = img.pixels();
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, _] = src.get_pixel(x, y).0;
        image::Rgb([r, g, b])
    })
}

fn to_luma(img: &CanonicalImage) -> GrayImage {
    let src = img.pixels();
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, _] = src.get_pixel(x, y).0;
        image::Luma([luma(r, g, b)])
    })
}

fn to_luma_alpha(img: &CanonicalImage) -> GrayAlphaImage {
    let src = img.pixels();
    GrayAlphaImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = src.get_pixel(x, y).0;
        LumaA([luma(r, g, b), a])
    })
}

fn encode_rgb_to_jpeg(rgb: &RgbImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

fn encode_gray_to_jpeg(gray: &GrayImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    gray.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

fn write_png<P>(img: &image::ImageBuffer<P, Vec<u8>>) -> crate::error::Result<Vec<u8>>
where
    P: image::PixelWithColorType<Subpixel = u8>,
{
    let mut buf = Cursor::new(Vec::new());
    img.write_with_encoder(PngEncoder::new(&mut buf))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 149);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_quality_bounds() {
        assert!(validate_quality(0).is_err());
        assert!(validate_quality(101).is_err());
        assert!(validate_quality(1).is_ok());
        assert!(validate_quality(100).is_ok());
    }

    #[test]
    fn test_select_codec() {
        assert_eq!(select_codec(true), OutputCodec::Lossless);
        assert_eq!(select_codec(false), OutputCodec::Lossy);
    }
}
