// CLI entry point tests

mod common;

use std::process::Command;

use common::{Storage, TestImage, build_pdf};

fn cargo_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pdf_recompress"))
}

// ============================================================
// 1. No arguments shows usage and exits with failure
// ============================================================

#[test]
fn test_main_no_args_shows_usage() {
    let output = cargo_bin().output().expect("failed to execute binary");

    assert!(
        !output.status.success(),
        "should exit with failure when no args given"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "stderr should contain 'Usage', got: {stderr}"
    );
}

// ============================================================
// 2. --help flag shows usage and exits with success
// ============================================================

#[test]
fn test_main_help_flag() {
    let output = cargo_bin()
        .arg("--help")
        .output()
        .expect("failed to execute binary");

    assert!(
        output.status.success(),
        "should exit with success for --help"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "stderr should contain 'Usage', got: {stderr}"
    );
}

// ============================================================
// 3. --version flag shows version and exits with success
// ============================================================

#[test]
fn test_main_version_flag() {
    let output = cargo_bin()
        .arg("--version")
        .output()
        .expect("failed to execute binary");

    assert!(
        output.status.success(),
        "should exit with success for --version"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    let version = env!("CARGO_PKG_VERSION");
    assert!(
        stderr.contains(version),
        "stderr should contain version '{version}', got: {stderr}"
    );
}

// ============================================================
// 4. Nonexistent job file produces error
// ============================================================

#[test]
fn test_main_nonexistent_job_file() {
    let unique_path = std::env::temp_dir().join(format!(
        "nonexistent_job_file_{}.yaml",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock error")
            .as_nanos()
    ));
    let output = cargo_bin()
        .arg(unique_path.as_os_str())
        .output()
        .expect("failed to execute binary");

    assert!(
        !output.status.success(),
        "should exit with failure for nonexistent file"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ERROR") || stderr.contains("error") || stderr.contains("Error"),
        "stderr should contain error message, got: {stderr}"
    );
}

// ============================================================
// 5. Job file run: derived output name and summary line
// ============================================================

#[test]
fn test_main_runs_job_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_pdf(
        &dir.path().join("scan.pdf"),
        &[vec![TestImage::new(64, 64, Storage::Dct)]],
    );
    std::fs::write(dir.path().join("settings.yaml"), "quality: 60\n").unwrap();
    let job_path = dir.path().join("jobs.yaml");
    std::fs::write(&job_path, "jobs:\n  - input: scan.pdf\n").unwrap();

    let output = cargo_bin()
        .arg(&job_path)
        .output()
        .expect("failed to execute binary");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("OK:"), "stderr: {stderr}");
    assert!(stderr.contains("1/1 images recompressed"), "stderr: {stderr}");
    assert!(dir.path().join("scan-compress-60-120dpi.pdf").exists());
}

// ============================================================
// 6. Invalid job settings are rejected before processing
// ============================================================

#[test]
fn test_main_rejects_invalid_quality() {
    let dir = tempfile::tempdir().expect("tempdir");
    build_pdf(&dir.path().join("scan.pdf"), &[vec![]]);
    let job_path = dir.path().join("jobs.yaml");
    std::fs::write(&job_path, "jobs:\n  - input: scan.pdf\n    quality: 0\n").unwrap();

    let output = cargo_bin()
        .arg(&job_path)
        .output()
        .expect("failed to execute binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR"));
    assert!(!dir.path().join("scan-compress-0-120dpi.pdf").exists());
}
