// Raw pixel buffers and the canonical RGBA representation shared by the
// decoder, the density reducer, and the encoder.

pub mod decoder;
pub mod density;
pub mod encoder;

use image::RgbaImage;

use crate::error::RecompressError;

/// Packed pixel layouts a document backend hands out.
///
/// Byte order follows the rasterizer convention: colour samples are stored
/// blue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 1 byte per pixel, luminance.
    Gray8,
    /// 3 bytes per pixel, (B, G, R).
    Bgr24,
    /// 4 bytes per pixel, (B, G, R, A).
    Bgra32,
    /// 4 bytes per pixel, (B, G, R, unused).
    Bgrx32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr24 => 3,
            PixelFormat::Bgra32 | PixelFormat::Bgrx32 => 4,
        }
    }

    /// Maps a rasterizer bitmap format code (1 = Gray, 2 = BGR, 3 = BGRx,
    /// 4 = BGRA) to a [`PixelFormat`].
    ///
    /// Entry point for backends that receive bitmaps from an external
    /// rasterizer as numeric format codes. The lopdf backend decodes streams
    /// itself and names its formats directly, so it never goes through here.
    /// Unknown codes are `UnsupportedFormatError`, which the pipeline reports
    /// as a skip.
    pub fn from_code(code: i32) -> crate::error::Result<Self> {
        match code {
            1 => Ok(PixelFormat::Gray8),
            2 => Ok(PixelFormat::Bgr24),
            3 => Ok(PixelFormat::Bgrx32),
            4 => Ok(PixelFormat::Bgra32),
            other => Err(RecompressError::unsupported_format(format!(
                "bitmap format code {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Bgra32 => "bgra32",
            PixelFormat::Bgrx32 => "bgrx32",
        }
    }
}

/// A raw bitmap as extracted from an embedded image.
///
/// `stride` is the number of bytes per row and may exceed
/// `width * bytes_per_pixel` when rows are padded.
#[derive(Debug, Clone)]
pub struct RawImageBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    /// First filter tag of the stream the bytes were produced from.
    pub source_filter: Option<String>,
}

impl RawImageBuffer {
    /// Builds a buffer with tightly packed rows.
    pub fn packed(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
            source_filter: None,
        }
    }

    pub fn with_source_filter(mut self, filter: Option<String>) -> Self {
        self.source_filter = filter;
        self
    }

    /// Minimum stride for this buffer's width and format.
    pub fn min_stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Decoded 8-bit RGBA image plus its transparency flag.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pixels: RgbaImage,
    has_transparency: bool,
    fallback_pixels: usize,
}

impl CanonicalImage {
    /// Wraps an RGBA image, scanning every alpha sample for transparency.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        let has_transparency = scan_transparency(&pixels);
        Self {
            pixels,
            has_transparency,
            fallback_pixels: 0,
        }
    }

    pub(crate) fn with_fallback_pixels(mut self, count: usize) -> Self {
        self.fallback_pixels = count;
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// True iff at least one pixel has alpha below 255.
    pub fn has_transparency(&self) -> bool {
        self.has_transparency
    }

    /// Number of pixels whose source bytes lay outside the raw buffer and
    /// were substituted during decoding.
    pub fn fallback_pixels(&self) -> usize {
        self.fallback_pixels
    }
}

fn scan_transparency(pixels: &RgbaImage) -> bool {
    pixels.as_raw().chunks_exact(4).any(|px| px[3] != 255)
}
