// Narrow interface between the recompression core and a page-structured
// document. The pipeline receives a backend handle explicitly; nothing holds
// a process-wide instance.

use std::fmt;
use std::hash::Hash;
use std::path::Path;

use crate::compositor::PlacementMatrix;
use crate::decision::{ExtractionMode, ImageMetadata};
use crate::raster::encoder::EncodedOutput;
use crate::raster::{CanonicalImage, RawImageBuffer};

/// Document services consumed by the pipeline.
///
/// Pages are 1-based. Errors from any method surface as
/// [`RecompressError::BackendError`](crate::error::RecompressError) and are
/// passed through by the caller unchanged.
pub trait DocumentBackend {
    /// Handle to one image object. Two handles compare equal iff they name
    /// the same underlying object, even when reached from different pages.
    type ImageRef: Clone + Eq + Hash + fmt::Debug + fmt::Display;

    fn page_count(&self) -> u32;

    /// Page width and height in points.
    fn page_size(&self, page: u32) -> crate::error::Result<(f64, f64)>;

    fn image_objects(&self, page: u32) -> crate::error::Result<Vec<Self::ImageRef>>;

    /// `Direct` returns the stored bitmap; `Rendered` a composite with the
    /// soft mask applied.
    fn raw_pixel_buffer(
        &self,
        image: &Self::ImageRef,
        mode: ExtractionMode,
    ) -> crate::error::Result<RawImageBuffer>;

    /// Filter chain in application order; empty when unfiltered.
    fn source_filters(&self, image: &Self::ImageRef) -> crate::error::Result<Vec<String>>;

    fn image_metadata(&self, image: &Self::ImageRef) -> crate::error::Result<ImageMetadata>;

    /// Length of the stored (still encoded) data.
    fn raw_data_len(&self, image: &Self::ImageRef) -> crate::error::Result<usize>;

    fn replace_image_data(
        &mut self,
        image: &Self::ImageRef,
        encoded: &EncodedOutput,
    ) -> crate::error::Result<()>;

    fn create_image_object(&mut self, image: &CanonicalImage)
    -> crate::error::Result<Self::ImageRef>;

    fn set_object_placement(
        &mut self,
        image: &Self::ImageRef,
        matrix: &PlacementMatrix,
    ) -> crate::error::Result<()>;

    /// Draw `image` on `page` with the placement last set for it.
    fn insert_object_on_page(&mut self, page: u32, image: &Self::ImageRef)
    -> crate::error::Result<()>;

    fn save(&mut self, path: &Path) -> crate::error::Result<()>;
}
