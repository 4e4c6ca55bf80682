// Density reducer: proportional bicubic downsampling toward a target DPI.

use image::imageops::{self, FilterType};
use tracing::debug;

use super::CanonicalImage;

/// Resampling kernel used for every reduction (bicubic class).
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// Target width for reducing `width` pixels from `source_dpi` to `target_dpi`.
///
/// Returns `None` when the result would not be narrower than the input, or
/// when either density is not a positive finite number.
pub fn reduced_width(width: u32, source_dpi: f64, target_dpi: f64) -> Option<u32> {
    if !(source_dpi.is_finite() && target_dpi.is_finite()) || source_dpi <= 0.0 || target_dpi <= 0.0
    {
        return None;
    }

    let new_width = (width as f64 * target_dpi / source_dpi).round();
    if new_width >= width as f64 {
        return None;
    }
    Some(new_width.max(1.0) as u32)
}

/// Downsample `img` so that its horizontal density becomes `target_dpi`.
///
/// Height follows from the same scale factor. Never upsamples: if the
/// computed width is not smaller than the current one, `img` comes back
/// unchanged.
pub fn reduce(img: CanonicalImage, source_dpi: f64, target_dpi: f64) -> CanonicalImage {
    let (width, height) = (img.width(), img.height());
    let Some(new_width) = reduced_width(width, source_dpi, target_dpi) else {
        return img;
    };

    let new_height = ((height as f64 * new_width as f64 / width as f64).round() as u32).max(1);

    debug!(
        width,
        height, new_width, new_height, source_dpi, target_dpi, "reducing image density"
    );

    let fallback = img.fallback_pixels();
    let resized = imageops::resize(img.pixels(), new_width, new_height, RESAMPLE_FILTER);
    CanonicalImage::from_rgba(resized).with_fallback_pixels(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduced_width_rounds() {
        assert_eq!(reduced_width(1000, 300.0, 120.0), Some(400));
        assert_eq!(reduced_width(999, 300.0, 150.0), Some(500));
    }

    #[test]
    fn test_reduced_width_never_upsamples() {
        assert_eq!(reduced_width(100, 72.0, 120.0), None);
        assert_eq!(reduced_width(100, 120.0, 120.0), None);
    }

    #[test]
    fn test_reduced_width_rejects_degenerate_density() {
        assert_eq!(reduced_width(100, 0.0, 120.0), None);
        assert_eq!(reduced_width(100, f64::NAN, 120.0), None);
        assert_eq!(reduced_width(100, 300.0, -1.0), None);
    }

    #[test]
    fn test_reduced_width_is_at_least_one() {
        assert_eq!(reduced_width(2, 10_000.0, 1.0), Some(1));
    }
}
