pub mod job;
pub mod merged;
pub mod settings;

use std::path::{Path, PathBuf};

use job::JobFile;
use settings::Settings;

use crate::error::RecompressError;

/// 出力ファイル名に埋め込む識別子
pub const OUTPUT_MARKER: &str = "-compress-";

/// ジョブファイルのパスからsettings.yamlを自動検出して読み込む。
///
/// ジョブファイルと同じディレクトリに `settings.yaml` が存在すれば読み込み、
/// 存在しなければデフォルト設定を返す。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    let dir = job_file_path
        .parent()
        .ok_or_else(|| RecompressError::config("Cannot determine job file directory"))?;

    let settings_path = dir.join("settings.yaml");

    if settings_path.exists() {
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}

/// ジョブYAMLファイルを読み込む。
pub fn load_job_file(path: &Path) -> crate::error::Result<JobFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yml::from_str(&content)?)
}

/// 相対パスをベースディレクトリ基準で解決する。絶対パスはそのまま返す。
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// 出力パスを入力パスから導出する: `<stem>-compress-<quality>-<dpi>dpi.pdf`
pub fn derive_output_path(input: &Path, quality: u8, target_dpi: f64) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!(
        "{stem}{OUTPUT_MARKER}{quality}-{target_dpi:.0}dpi.pdf"
    ))
}

/// 入出力パスの組み合わせを検証する。
///
/// 既に出力済みのファイル（名前に `-compress-` を含む）を入力にしたり、
/// 入力を上書きするジョブはエラーにする。
pub fn validate_job_paths(input: &Path, output: &Path) -> crate::error::Result<()> {
    let already_processed = input
        .file_name()
        .is_some_and(|n| n.to_string_lossy().contains(OUTPUT_MARKER));
    if already_processed {
        return Err(RecompressError::config(format!(
            "{} looks like an already recompressed file",
            input.display()
        )));
    }
    if input == output {
        return Err(RecompressError::config(format!(
            "output would overwrite input: {}",
            input.display()
        )));
    }
    Ok(())
}
