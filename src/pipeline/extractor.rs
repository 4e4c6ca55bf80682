// Dump page images to files: `<stem>_<page>_<index>.<ext>`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::backend::DocumentBackend;
use crate::decision::ExtractionMode;
use crate::raster::{decoder, encoder};

/// Quality used for lossy dumps.
const EXTRACT_QUALITY: u8 = 100;

/// Write each image on `pages` to `dir`, returning the files written.
///
/// Images that cannot be decoded are logged and skipped.
pub fn extract_images<B: DocumentBackend>(
    backend: &B,
    pages: &[u32],
    dir: &Path,
    stem: &str,
) -> crate::error::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for &page in pages {
        for (index, image) in backend.image_objects(page)?.iter().enumerate() {
            let encoded = backend
                .raw_pixel_buffer(image, ExtractionMode::Rendered)
                .and_then(|raw| decoder::decode(&raw))
                .and_then(|img| encoder::encode(&img, EXTRACT_QUALITY, false));
            let encoded = match encoded {
                Ok(e) => e,
                Err(e) => {
                    warn!(page, object = %image, error = %e, "cannot extract image");
                    continue;
                }
            };

            let path = dir.join(format!(
                "{stem}_{page}_{index}.{}",
                encoded.codec.extension()
            ));
            std::fs::write(&path, &encoded.data)?;
            written.push(path);
        }
    }

    info!(dir = %dir.display(), count = written.len(), "images extracted");
    Ok(written)
}
