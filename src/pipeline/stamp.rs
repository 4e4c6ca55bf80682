// Logo stamping: one shared image object drawn in the bottom-right corner of each page.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::backend::DocumentBackend;
use crate::compositor::placement;
use crate::error::RecompressError;
use crate::raster::CanonicalImage;

#[derive(Debug, Clone, PartialEq)]
pub struct StampConfig {
    pub path: PathBuf,
    pub scale_divisor: f64,
    pub margin_ratio: f64,
}

/// Load a PNG or JPEG stamp image.
pub fn load_stamp(path: &Path) -> crate::error::Result<CanonicalImage> {
    let img = image::open(path).map_err(|e| {
        RecompressError::config(format!("Failed to load stamp {}: {e}", path.display()))
    })?;
    Ok(CanonicalImage::from_rgba(img.to_rgba8()))
}

/// Create the stamp object once, then place it on every page in `pages`.
///
/// Returns the number of pages stamped.
#[instrument(skip(backend, stamp), fields(width = stamp.width(), height = stamp.height()))]
pub fn apply_stamp<B: DocumentBackend>(
    backend: &mut B,
    stamp: &CanonicalImage,
    pages: &[u32],
    scale_divisor: f64,
    margin_ratio: f64,
) -> crate::error::Result<usize> {
    let object = backend.create_image_object(stamp)?;
    let (sw, sh) = (f64::from(stamp.width()), f64::from(stamp.height()));

    for &page in pages {
        let (pw, ph) = backend.page_size(page)?;
        let matrix = placement(pw, ph, sw, sh, scale_divisor, margin_ratio)?;
        debug!(page, matrix = ?matrix.to_array(), "placing stamp");
        backend.set_object_placement(&object, &matrix)?;
        backend.insert_object_on_page(page, &object)?;
    }
    Ok(pages.len())
}
