// Stamp placement: affine matrix that puts a logo in the bottom-right corner
// of a page, scaled relative to a reference page size.

use crate::error::RecompressError;

/// Short edge of an A4 page in points; the page scale baseline.
pub const REFERENCE_DIMENSION: f64 = 595.0;

/// Bottom offset as a fraction of the page height.
pub const BOTTOM_MARGIN_RATIO: f64 = 7.0 / 500.0;

pub const DEFAULT_SCALE_DIVISOR: f64 = 6.0;

pub const DEFAULT_MARGIN_RATIO: f64 = 21.0 / 354.0;

/// PDF affine matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementMatrix {
    /// Horizontal scale.
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Vertical scale.
    pub d: f64,
    /// Horizontal translation.
    pub e: f64,
    /// Vertical translation.
    pub f: f64,
}

impl PlacementMatrix {
    pub fn scale_x(&self) -> f64 {
        self.a
    }

    pub fn scale_y(&self) -> f64 {
        self.d
    }

    pub fn translate_x(&self) -> f64 {
        self.e
    }

    pub fn translate_y(&self) -> f64 {
        self.f
    }

    /// Operands for a `cm` operator.
    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

/// Compute the stamp placement for one page.
///
/// `scale_divisor` shrinks the stamp relative to its pixel size;
/// `margin_ratio * stamp_width` is the right margin.
///
/// # Errors
/// * `InvalidGeometryError` when any input is zero, negative, or not finite.
pub fn placement(
    page_width: f64,
    page_height: f64,
    stamp_width: f64,
    stamp_height: f64,
    scale_divisor: f64,
    margin_ratio: f64,
) -> crate::error::Result<PlacementMatrix> {
    let positive = [
        ("page width", page_width),
        ("page height", page_height),
        ("stamp width", stamp_width),
        ("stamp height", stamp_height),
        ("scale divisor", scale_divisor),
    ];
    for (name, value) in positive {
        if !value.is_finite() || value <= 0.0 {
            return Err(RecompressError::invalid_geometry(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }
    if !margin_ratio.is_finite() || margin_ratio < 0.0 {
        return Err(RecompressError::invalid_geometry(format!(
            "margin ratio must be non-negative, got {margin_ratio}"
        )));
    }

    let page_scale = page_width.min(page_height) / REFERENCE_DIMENSION;
    let scale_x = page_scale * stamp_width / scale_divisor;
    let scale_y = page_scale * stamp_height / scale_divisor;

    Ok(PlacementMatrix {
        a: scale_x,
        b: 0.0,
        c: 0.0,
        d: scale_y,
        e: page_width - scale_x - margin_ratio * stamp_width,
        f: BOTTOM_MARGIN_RATIO * page_height,
    })
}
