// ジョブ単位: PDF読込 -> 画像抽出 -> 並列再圧縮 -> 書き戻し -> 保存

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::backend::DocumentBackend;
use crate::cache::store::CacheStore;
use crate::decision::DecisionConfig;
use crate::error::RecompressError;
use crate::pdf::document::LopdfBackend;
use crate::pipeline::image_processor::{
    EncodeParams, Extraction, ImageOutcome, ImageReport, Notice, ProcessedImage, extract_image,
    process_extracted,
};
use crate::pipeline::stamp::{StampConfig, apply_stamp, load_stamp};
use crate::pipeline::extractor::extract_images;

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 1-based pages to process; `None` means all pages.
    pub pages: Option<Vec<u32>>,
    pub quality: u8,
    pub force_gray: bool,
    pub only_if_smaller: bool,
    pub decision: DecisionConfig,
    /// 0 lets rayon pick the thread count.
    pub parallel_workers: usize,
    pub cache_dir: Option<PathBuf>,
    pub stamp: Option<StampConfig>,
    /// Dump the original images here before recompression.
    pub extract_dir: Option<PathBuf>,
}

impl JobConfig {
    fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            quality: self.quality,
            force_gray: self.force_gray,
            only_if_smaller: self.only_if_smaller,
        }
    }
}

/// Aggregate counts over every image seen by a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecompressStats {
    pub total_images: usize,
    pub recompressed: usize,
    pub skipped: usize,
    pub kept: usize,
    pub failed: usize,
    pub truncated: usize,
    /// Keyed by first filter, `"none"` when unfiltered.
    pub by_filter: BTreeMap<String, usize>,
    pub by_color_space: BTreeMap<String, usize>,
    pub by_skip_reason: BTreeMap<String, usize>,
}

impl RecompressStats {
    pub fn from_reports(reports: &[ImageReport]) -> Self {
        let mut stats = RecompressStats {
            total_images: reports.len(),
            ..Default::default()
        };
        for report in reports {
            let filter = report
                .filters
                .first()
                .cloned()
                .unwrap_or_else(|| crate::decision::NO_FILTER_KEY.to_string());
            *stats.by_filter.entry(filter).or_default() += 1;
            if !report.color_space.is_empty() {
                *stats
                    .by_color_space
                    .entry(report.color_space.clone())
                    .or_default() += 1;
            }

            match &report.outcome {
                ImageOutcome::Skipped(reason) => {
                    stats.skipped += 1;
                    *stats
                        .by_skip_reason
                        .entry(reason.code().to_string())
                        .or_default() += 1;
                }
                ImageOutcome::Recompressed(summary) => {
                    stats.recompressed += 1;
                    if summary
                        .notices
                        .iter()
                        .any(|n| matches!(n, Notice::TruncatedBuffer { .. }))
                    {
                        stats.truncated += 1;
                    }
                }
                ImageOutcome::Kept { .. } => stats.kept += 1,
                ImageOutcome::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }
}

/// Result of processing a single job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub pages_processed: usize,
    pub images: Vec<ImageReport>,
    pub stats: RecompressStats,
    pub extracted_files: Vec<PathBuf>,
    pub input_size: u64,
    pub output_size: u64,
}

/// Outcome of running the pipeline against an open backend.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub pages_processed: usize,
    pub images: Vec<ImageReport>,
    pub stats: RecompressStats,
    pub extracted_files: Vec<PathBuf>,
}

/// Run a single job against a PDF file on disk.
pub fn run_job(config: &JobConfig) -> crate::error::Result<JobResult> {
    crate::config::validate_job_paths(&config.input_path, &config.output_path)?;

    let input_size = std::fs::metadata(&config.input_path)?.len();
    let mut backend = LopdfBackend::open(&config.input_path)?;
    let result = process_document(&mut backend, config)?;
    backend.save(&config.output_path)?;
    let output_size = std::fs::metadata(&config.output_path)?.len();

    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        input_size,
        output_size,
        recompressed = result.stats.recompressed,
        total = result.stats.total_images,
        "job finished"
    );

    Ok(JobResult {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        pages_processed: result.pages_processed,
        images: result.images,
        stats: result.stats,
        extracted_files: result.extracted_files,
        input_size,
        output_size,
    })
}

/// Run the pipeline on an already opened document, leaving it modified in
/// place. Saving is up to the caller.
///
/// Phase A: image extraction (sequential, needs the backend)
/// Phase B: decode / reduce / encode (rayon parallel)
/// Phase C: write-back and stamping (sequential)
pub fn process_document<B>(
    backend: &mut B,
    config: &JobConfig,
) -> crate::error::Result<DocumentResult>
where
    B: DocumentBackend,
    B::ImageRef: Send,
{
    let pages = resolve_pages(backend.page_count(), config.pages.as_deref())?;

    let extracted_files = match &config.extract_dir {
        Some(dir) => {
            let stem = config
                .input_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            extract_images(&*backend, &pages, dir, &stem)?
        }
        None => Vec::new(),
    };

    // --- Phase A: extraction (sequential) ---
    let mut seen = HashSet::new();
    let mut reports: Vec<ImageReport> = Vec::new();
    let mut ready = Vec::new();
    for &page in &pages {
        for image in backend.image_objects(page)? {
            if !seen.insert(image.clone()) {
                continue;
            }
            match extract_image(&*backend, page, &image, &config.decision) {
                Extraction::Done(report) => reports.push(report),
                Extraction::Ready(extracted) => ready.push(extracted),
            }
        }
    }

    // --- Phase B: recompression (rayon parallel) ---
    let params = config.encode_params();
    let cache_store = config.cache_dir.as_ref().map(CacheStore::new);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_workers)
        .build()
        .map_err(|e| RecompressError::config(format!("Failed to build thread pool: {e}")))?;
    let processed: Vec<ProcessedImage<B::ImageRef>> = pool.install(|| {
        ready
            .into_par_iter()
            .map(|extracted| process_extracted(extracted, &params, cache_store.as_ref()))
            .collect()
    });

    // --- Phase C: write-back (sequential) ---
    for item in processed {
        let mut report = item.report;
        if let Some(output) = item.output
            && let Err(e) = backend.replace_image_data(&item.image, &output)
        {
            warn!(object = %report.object, error = %e, "write-back failed");
            report.outcome = ImageOutcome::Failed(e.to_string());
        }
        reports.push(report);
    }
    reports.sort_by(|a, b| a.page.cmp(&b.page).then_with(|| a.object.cmp(&b.object)));

    if let Some(stamp) = &config.stamp {
        let image = load_stamp(&stamp.path)?;
        apply_stamp(
            backend,
            &image,
            &pages,
            stamp.scale_divisor,
            stamp.margin_ratio,
        )?;
    }

    let stats = RecompressStats::from_reports(&reports);
    Ok(DocumentResult {
        pages_processed: pages.len(),
        images: reports,
        stats,
        extracted_files,
    })
}

/// 指定ページを検証する。未指定なら全ページ。
fn resolve_pages(page_count: u32, requested: Option<&[u32]>) -> crate::error::Result<Vec<u32>> {
    match requested {
        None => Ok((1..=page_count).collect()),
        Some(pages) => {
            for &page in pages {
                if page < 1 || page > page_count {
                    return Err(RecompressError::config(format!(
                        "page {page} out of range (document has {page_count} pages)"
                    )));
                }
            }
            Ok(pages.to_vec())
        }
    }
}
