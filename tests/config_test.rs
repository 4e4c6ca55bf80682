// 設定ファイル解析テスト

use std::io::Write;
use std::path::{Path, PathBuf};

use pdf_recompress::config::job::{JobFile, parse_page_range};
use pdf_recompress::config::merged::MergedConfig;
use pdf_recompress::config::settings::Settings;
use pdf_recompress::config::{derive_output_path, load_job_file, load_settings_for_job};
use pdf_recompress::decision::FilterRoute;

// ============================================================
// 1. ページ範囲パーサ
// ============================================================

#[test]
fn test_parse_page_range_single_range() {
    let result = parse_page_range("5-10").expect("should parse range");
    assert_eq!(result, vec![5, 6, 7, 8, 9, 10]);
}

#[test]
fn test_parse_page_range_mixed() {
    let result = parse_page_range("1, 3, 5-7, 3").expect("should parse mixed");
    assert_eq!(result, vec![1, 3, 5, 6, 7]);
}

#[test]
fn test_parse_page_range_invalid() {
    assert!(parse_page_range("abc").is_err());
    assert!(parse_page_range("10-5").is_err());
    assert!(parse_page_range("").is_err());
    assert!(parse_page_range("0").is_err());
}

// ============================================================
// 2. Settings のデシリアライズ
// ============================================================

#[test]
fn test_settings_empty_yaml() {
    let settings = Settings::from_yaml("{}").expect("should use defaults for empty YAML");
    assert_eq!(settings.quality, 75);
    assert_eq!(settings.target_dpi, 120.0);
    assert_eq!(settings.dpi_ceiling, 120.0);
    assert_eq!(settings.min_worthwhile_bytes, 1000);
    assert!(!settings.force_gray);
    assert!(!settings.only_if_smaller);
    assert_eq!(settings.parallel_workers, 0);
    assert!(settings.cache_dir.is_none());
    assert_eq!(settings.stamp_scale_divisor, 6.0);
    assert_eq!(
        settings.filter_routes.route(Some("FlateDecode")),
        Some(FilterRoute::Rendered)
    );
}

#[test]
fn test_settings_full_yaml() {
    let yaml = r#"
quality: 60
target_dpi: 150
dpi_ceiling: 200
min_worthwhile_bytes: 4096
force_gray: true
only_if_smaller: true
parallel_workers: 4
cache_dir: "/tmp/cache"
stamp_scale_divisor: 8
stamp_margin_ratio: 0.1
filter_routes:
  DCTDecode: direct
  LZWDecode: direct
  CCITTFaxDecode: preserve
"#;
    let settings = Settings::from_yaml(yaml).expect("should parse full YAML");
    assert_eq!(settings.quality, 60);
    assert_eq!(settings.target_dpi, 150.0);
    assert_eq!(settings.dpi_ceiling, 200.0);
    assert_eq!(settings.min_worthwhile_bytes, 4096);
    assert!(settings.force_gray);
    assert!(settings.only_if_smaller);
    assert_eq!(settings.parallel_workers, 4);
    assert_eq!(settings.cache_dir.as_deref(), Some(Path::new("/tmp/cache")));
    assert_eq!(settings.stamp_scale_divisor, 8.0);
    assert_eq!(settings.stamp_margin_ratio, 0.1);
    assert_eq!(
        settings.filter_routes.route(Some("LZWDecode")),
        Some(FilterRoute::Direct)
    );
    // ルート表は丸ごと置き換わる
    assert_eq!(settings.filter_routes.route(Some("FlateDecode")), None);
}

#[test]
fn test_settings_invalid_yaml() {
    assert!(Settings::from_yaml("quality: [1, 2]").is_err());
}

// ============================================================
// 3. Job 構造体のデシリアライズ
// ============================================================

#[test]
fn test_job_required_fields_only() {
    let yaml = r#"
jobs:
  - input: "input.pdf"
"#;
    let job_file: JobFile = serde_yml::from_str(yaml).expect("should parse required fields");
    let job = &job_file.jobs[0];
    assert_eq!(job.input, "input.pdf");
    assert!(job.output.is_none());
    assert!(job.pages.is_none());
    assert!(job.quality.is_none());
    assert!(job.stamp.is_none());
    assert!(job.extract_dir.is_none());
}

#[test]
fn test_job_all_fields() {
    let yaml = r#"
jobs:
  - input: "a.pdf"
    output: "b.pdf"
    pages: "1-3, 7"
    quality: 50
    target_dpi: 100
    dpi_ceiling: 150
    force_gray: true
    only_if_smaller: true
    stamp: "logo.png"
    extract_dir: "images"
  - input: "c.pdf"
    pages: 4
"#;
    let job_file: JobFile = serde_yml::from_str(yaml).expect("should parse");
    let job = &job_file.jobs[0];
    assert_eq!(job.output.as_deref(), Some("b.pdf"));
    assert_eq!(job.pages, Some(vec![1, 2, 3, 7]));
    assert_eq!(job.quality, Some(50));
    assert_eq!(job.target_dpi, Some(100.0));
    assert_eq!(job.dpi_ceiling, Some(150.0));
    assert_eq!(job.force_gray, Some(true));
    assert_eq!(job.only_if_smaller, Some(true));
    assert_eq!(job.stamp.as_deref(), Some("logo.png"));
    assert_eq!(job.extract_dir.as_deref(), Some("images"));

    assert_eq!(job_file.jobs[1].pages, Some(vec![4]));
}

#[test]
fn test_job_bad_pages_rejected() {
    let yaml = r#"
jobs:
  - input: "a.pdf"
    pages: "3-1"
"#;
    assert!(serde_yml::from_str::<JobFile>(yaml).is_err());
}

// ============================================================
// 4. マージと検証
// ============================================================

#[test]
fn test_merged_job_overrides_settings() {
    let settings = Settings::from_yaml("quality: 60\ntarget_dpi: 150").unwrap();
    let job_file: JobFile =
        serde_yml::from_str("jobs:\n  - input: a.pdf\n    quality: 90\n").unwrap();

    let merged = MergedConfig::new(&settings, &job_file.jobs[0]);
    assert_eq!(merged.quality, 90);
    assert_eq!(merged.target_dpi, 150.0);
    assert!(merged.validate().is_ok());

    let decision = merged.decision_config();
    assert_eq!(decision.target_dpi, 150.0);
    assert_eq!(decision.min_worthwhile_bytes, 1000);
}

#[test]
fn test_merged_validation() {
    let settings = Settings::default();
    let job_file: JobFile = serde_yml::from_str(
        "jobs:\n  - input: a.pdf\n    quality: 0\n  - input: b.pdf\n    target_dpi: -5\n",
    )
    .unwrap();

    for job in &job_file.jobs {
        assert!(MergedConfig::new(&settings, job).validate().is_err());
    }
}

// ============================================================
// 5. ファイル読み込みとパス
// ============================================================

#[test]
fn test_load_settings_next_to_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let job_path = dir.path().join("jobs.yaml");

    // settings.yaml がなければデフォルト
    assert_eq!(load_settings_for_job(&job_path).unwrap().quality, 75);

    let mut f = std::fs::File::create(dir.path().join("settings.yaml")).unwrap();
    writeln!(f, "quality: 40").unwrap();
    assert_eq!(load_settings_for_job(&job_path).unwrap().quality, 40);
}

#[test]
fn test_load_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let job_path = dir.path().join("jobs.yaml");
    std::fs::write(&job_path, "jobs:\n  - input: a.pdf\n  - input: b.pdf\n").unwrap();
    assert_eq!(load_job_file(&job_path).unwrap().jobs.len(), 2);

    std::fs::write(&job_path, "jobs: nope").unwrap();
    assert!(load_job_file(&job_path).is_err());
}

#[test]
fn test_derived_output_name() {
    assert_eq!(
        derive_output_path(Path::new("scans/book.pdf"), 60, 150.0),
        PathBuf::from("scans/book-compress-60-150dpi.pdf")
    );
}
