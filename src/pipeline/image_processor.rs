// Per-image processing: decide -> extract -> decode -> reduce -> encode.
//
// Extraction touches the backend and runs sequentially; the rest is pure and
// runs on the rayon pool. Every image ends in an ImageReport, failures
// included.

use tracing::{debug, instrument, warn};

use crate::backend::DocumentBackend;
use crate::cache::hash::{EncodeSettings, compute_cache_key};
use crate::cache::store::CacheStore;
use crate::decision::{DecisionConfig, DensityHint, ExtractionMode, Outcome, SkipReason, decide};
use crate::error::RecompressError;
use crate::raster::encoder::{EncodedOutput, OutputCodec, encode};
use crate::raster::{RawImageBuffer, decoder, density};

/// Parameters for the encode stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub quality: u8,
    pub force_gray: bool,
    /// Keep the original stream when the re-encoded payload is not smaller.
    pub only_if_smaller: bool,
}

/// Degradations that did not stop an image from being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Pixels outside the raw buffer were substituted during decoding.
    TruncatedBuffer { pixels: usize },
    /// The rendered composite was fully opaque; the stored bitmap was used.
    RenderedFallbackToDirect,
    CacheHit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecompressSummary {
    pub mode: ExtractionMode,
    pub codec: OutputCodec,
    pub original_len: usize,
    pub new_len: usize,
    /// Pixel size after density reduction, if any.
    pub reduced_to: Option<(u32, u32)>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Skipped(SkipReason),
    Recompressed(RecompressSummary),
    /// Re-encoding did not shrink the stream; original kept.
    Kept { original_len: usize, new_len: usize },
    Failed(String),
}

/// What happened to one image object.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    pub page: u32,
    pub object: String,
    pub filters: Vec<String>,
    pub color_space: String,
    pub raw_len: usize,
    pub outcome: ImageOutcome,
}

/// Pixels pulled from the backend, ready for the pure stages.
#[derive(Debug, Clone)]
pub struct ExtractedImage<R> {
    pub image: R,
    pub report: ImageReport,
    pub mode: ExtractionMode,
    pub reduce: Option<DensityHint>,
    pub buffer: RawImageBuffer,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
pub enum Extraction<R> {
    /// Terminal: skipped or failed before any pixels were produced.
    Done(ImageReport),
    Ready(ExtractedImage<R>),
}

/// Result of the pure stages; `output` is set only when the document should
/// be rewritten.
#[derive(Debug, Clone)]
pub struct ProcessedImage<R> {
    pub image: R,
    pub report: ImageReport,
    pub output: Option<EncodedOutput>,
}

/// Decide for one image and, on Process, fetch its pixel buffer.
#[instrument(skip(backend, image, decision), fields(object = %image))]
pub fn extract_image<B: DocumentBackend>(
    backend: &B,
    page: u32,
    image: &B::ImageRef,
    decision: &DecisionConfig,
) -> Extraction<B::ImageRef> {
    let mut report = ImageReport {
        page,
        object: image.to_string(),
        filters: Vec::new(),
        color_space: String::new(),
        raw_len: 0,
        outcome: ImageOutcome::Failed(String::new()),
    };

    let probe = (|| -> crate::error::Result<_> {
        let filters = backend.source_filters(image)?;
        let raw_len = backend.raw_data_len(image)?;
        let meta = backend.image_metadata(image)?;
        Ok((filters, raw_len, meta))
    })();
    let (filters, raw_len, meta) = match probe {
        Ok(p) => p,
        Err(e) => return Extraction::Done(fail(report, e)),
    };
    report.filters = filters;
    report.raw_len = raw_len;
    report.color_space = meta.color_space.clone();

    let first_filter = report.filters.first().map(String::as_str);
    let plan = match decide(first_filter, raw_len, &meta, decision) {
        Outcome::Skip(reason) => {
            report.outcome = ImageOutcome::Skipped(reason);
            return Extraction::Done(report);
        }
        Outcome::Process(plan) => plan,
    };

    let mut notices = Vec::new();
    let buffer = match fetch_buffer(backend, image, plan.mode, &mut notices) {
        Ok(b) => b,
        Err(e) => return Extraction::Done(fail(report, e)),
    };

    Extraction::Ready(ExtractedImage {
        image: image.clone(),
        report,
        mode: plan.mode,
        reduce: plan.reduce,
        buffer,
        notices,
    })
}

/// Rendered composites without any transparency carry nothing the stored
/// bitmap lacks, so the stored bitmap is used instead.
fn fetch_buffer<B: DocumentBackend>(
    backend: &B,
    image: &B::ImageRef,
    mode: ExtractionMode,
    notices: &mut Vec<Notice>,
) -> crate::error::Result<RawImageBuffer> {
    let buffer = backend.raw_pixel_buffer(image, mode)?;
    if mode == ExtractionMode::Direct {
        return Ok(buffer);
    }

    if decoder::decode(&buffer)?.has_transparency() {
        return Ok(buffer);
    }

    match backend.raw_pixel_buffer(image, ExtractionMode::Direct) {
        Ok(direct) => {
            debug!(object = %image, "rendered bitmap is opaque, using stored bitmap");
            notices.push(Notice::RenderedFallbackToDirect);
            Ok(direct)
        }
        Err(e) => {
            warn!(object = %image, error = %e, "stored bitmap unavailable, keeping rendered bitmap");
            Ok(buffer)
        }
    }
}

fn fail(mut report: ImageReport, err: RecompressError) -> ImageReport {
    report.outcome = match err {
        RecompressError::UnsupportedFormatError(detail) => {
            ImageOutcome::Skipped(SkipReason::UnsupportedFormat { detail })
        }
        other => {
            warn!(object = %report.object, error = %other, "image failed");
            ImageOutcome::Failed(other.to_string())
        }
    };
    report
}

/// Decode, optionally reduce, and encode one buffer.
///
/// Returns the encoded output and the reduced size when a reduction
/// actually happened. Substituted pixels are carried on the output.
pub fn recompress_buffer(
    buffer: &RawImageBuffer,
    reduce: Option<DensityHint>,
    quality: u8,
    force_gray: bool,
) -> crate::error::Result<(EncodedOutput, Option<(u32, u32)>)> {
    let mut img = decoder::decode(buffer)?;

    let mut reduced_to = None;
    if let Some(hint) = reduce {
        let before = (img.width(), img.height());
        img = density::reduce(img, hint.source_dpi, hint.target_dpi);
        if (img.width(), img.height()) != before {
            reduced_to = Some((img.width(), img.height()));
        }
    }

    let output = encode(&img, quality, force_gray)?;
    Ok((output, reduced_to))
}

/// Run the pure stages for an extracted image, consulting the cache first.
pub fn process_extracted<R>(
    extracted: ExtractedImage<R>,
    params: &EncodeParams,
    cache: Option<&CacheStore>,
) -> ProcessedImage<R> {
    let ExtractedImage {
        image,
        mut report,
        mode,
        reduce,
        buffer,
        mut notices,
    } = extracted;

    let settings = EncodeSettings {
        quality: params.quality,
        force_gray: params.force_gray,
        reduce: reduce.map(|h| (h.source_dpi, h.target_dpi)),
    };
    let key = cache.map(|_| compute_cache_key(&buffer, &settings));

    let cached = match (cache, key.as_deref()) {
        (Some(store), Some(key)) => store.retrieve(key).unwrap_or_else(|e| {
            warn!(object = %report.object, error = %e, "cache read failed");
            None
        }),
        _ => None,
    };

    let (output, reduced_to) = match cached {
        Some(output) => {
            notices.push(Notice::CacheHit);
            let reduced = (output.width != buffer.width).then_some((output.width, output.height));
            (output, reduced)
        }
        None => match recompress_buffer(&buffer, reduce, params.quality, params.force_gray) {
            Ok((output, reduced_to)) => {
                if let (Some(store), Some(key)) = (cache, key.as_deref())
                    && let Err(e) = store.store(key, &output)
                {
                    warn!(object = %report.object, error = %e, "cache write failed");
                }
                (output, reduced_to)
            }
            Err(e) => {
                report.outcome = ImageOutcome::Failed(e.to_string());
                warn!(object = %report.object, error = %e, "image failed");
                return ProcessedImage {
                    image,
                    report,
                    output: None,
                };
            }
        },
    };

    if output.fallback_pixels > 0 {
        notices.push(Notice::TruncatedBuffer {
            pixels: output.fallback_pixels,
        });
    }

    let new_len = output.data.len();
    if params.only_if_smaller && new_len >= report.raw_len {
        report.outcome = ImageOutcome::Kept {
            original_len: report.raw_len,
            new_len,
        };
        return ProcessedImage {
            image,
            report,
            output: None,
        };
    }

    report.outcome = ImageOutcome::Recompressed(RecompressSummary {
        mode,
        codec: output.codec,
        original_len: report.raw_len,
        new_len,
        reduced_to,
        notices,
    });
    ProcessedImage {
        image,
        report,
        output: Some(output),
    }
}
