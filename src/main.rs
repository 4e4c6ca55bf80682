use std::path::Path;
use std::process::ExitCode;

use pdf_recompress::config::merged::MergedConfig;
use pdf_recompress::config::{self, derive_output_path, resolve_path, validate_job_paths};
use pdf_recompress::pipeline::job_runner::JobConfig;
use pdf_recompress::pipeline::orchestrator::run_all_jobs;
use pdf_recompress::pipeline::stamp::StampConfig;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: pdf_recompress <jobs.yaml>...");
        eprintln!("  Recompress the raster images of PDF files according to job specifications.");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_recompress {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let mut job_configs: Vec<JobConfig> = Vec::new();

    for job_file_arg in &args {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file = match config::load_job_file(job_file_path) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: Failed to load job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_dir = job_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        for job in &job_file.jobs {
            let merged = MergedConfig::new(&settings, job);
            if let Err(e) = merged.validate() {
                eprintln!("ERROR: {}: {e}", job.input);
                return ExitCode::FAILURE;
            }

            let input_path = resolve_path(&job_dir, &job.input);
            let output_path = match &job.output {
                Some(out) => resolve_path(&job_dir, out),
                None => derive_output_path(&input_path, merged.quality, merged.target_dpi),
            };
            if let Err(e) = validate_job_paths(&input_path, &output_path) {
                eprintln!("ERROR: {e}");
                return ExitCode::FAILURE;
            }

            job_configs.push(JobConfig {
                input_path,
                output_path,
                pages: job.pages.clone(),
                quality: merged.quality,
                force_gray: merged.force_gray,
                only_if_smaller: merged.only_if_smaller,
                decision: merged.decision_config(),
                parallel_workers: merged.parallel_workers,
                cache_dir: merged.cache_dir.as_ref().map(|d| job_dir.join(d)),
                stamp: job.stamp.as_ref().map(|s| StampConfig {
                    path: resolve_path(&job_dir, s),
                    scale_divisor: merged.stamp_scale_divisor,
                    margin_ratio: merged.stamp_margin_ratio,
                }),
                extract_dir: job.extract_dir.as_ref().map(|d| resolve_path(&job_dir, d)),
            });
        }
    }

    let results = run_all_jobs(&job_configs);

    let mut has_error = false;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(job_result) => {
                eprintln!(
                    "OK: {} -> {} ({} pages, {}/{} images recompressed, {} -> {} bytes)",
                    job_result.input_path.display(),
                    job_result.output_path.display(),
                    job_result.pages_processed,
                    job_result.stats.recompressed,
                    job_result.stats.total_images,
                    job_result.input_size,
                    job_result.output_size
                );
            }
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e}",
                    job_configs[i].input_path.display(),
                    job_configs[i].output_path.display()
                );
                has_error = true;
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
