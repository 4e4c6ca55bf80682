// ファイルシステムキャッシュ: hash → エンコード済み画像
//
// Stores and retrieves EncodedOutput on disk, keyed by SHA-256 hash.
// Entries: payload.bin, metadata.json

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RecompressError;
use crate::raster::encoder::{EncodedOutput, OutputCodec};

/// キャッシュエントリの必須ファイル。
const CACHE_FILES: &[&str] = &["payload.bin", "metadata.json"];

/// ファイルシステムベースのキャッシュストア。
///
/// `<cache_dir>/<hex_hash>/` 以下にエンコード結果を格納する。
pub struct CacheStore {
    cache_dir: PathBuf,
}

/// metadata.json に保存するエンコード結果のメタデータ。
#[derive(serde::Serialize, serde::Deserialize)]
struct CacheMetadata {
    cache_key: String,
    codec: OutputCodec,
    width: u32,
    height: u32,
    quality: u8,
    grayscale: bool,
    #[serde(default)]
    has_alpha: bool,
    #[serde(default)]
    fallback_pixels: usize,
}

/// キャッシュキーが有効な SHA-256 hex 文字列であることを検証する。
///
/// 有効なキーは正確に64文字の小文字16進数([0-9a-f])である必要がある。
/// パストラバーサルや不正なディレクトリアクセスを防止する。
fn validate_cache_key(key: &str) -> crate::error::Result<()> {
    if key.len() == 64 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(())
    } else {
        Err(RecompressError::cache(format!(
            "invalid cache key: expected 64-character lowercase hex string, got '{}'",
            key
        )))
    }
}

impl CacheStore {
    /// 指定されたディレクトリをキャッシュルートとして新しい CacheStore を作成する。
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// キャッシュキーからディレクトリパスを計算する。
    fn key_dir(&self, key: &str) -> crate::error::Result<PathBuf> {
        validate_cache_key(key)?;
        Ok(self.cache_dir.join(key))
    }

    /// EncodedOutput をキャッシュに保存する。
    ///
    /// 書き込みはアトミック: 一時ディレクトリにファイルを書き込み、
    /// 最後にrenameで最終パスに移動する。
    pub fn store(&self, key: &str, output: &EncodedOutput) -> crate::error::Result<()> {
        let dir = self.key_dir(key)?;
        let tmp_dir = dir.with_extension("tmp");

        if tmp_dir.exists() {
            let _ = fs::remove_dir_all(&tmp_dir);
        }
        fs::create_dir_all(&tmp_dir).map_err(|e| RecompressError::cache(e.to_string()))?;

        fs::write(tmp_dir.join("payload.bin"), &output.data)
            .map_err(|e| RecompressError::cache(e.to_string()))?;

        let metadata = CacheMetadata {
            cache_key: key.to_string(),
            codec: output.codec,
            width: output.width,
            height: output.height,
            quality: output.quality,
            grayscale: output.grayscale,
            has_alpha: output.has_alpha,
            fallback_pixels: output.fallback_pixels,
        };
        let metadata_json = serde_json::to_string(&metadata)?;
        fs::write(tmp_dir.join("metadata.json"), metadata_json.as_bytes())
            .map_err(|e| RecompressError::cache(e.to_string()))?;

        if dir.exists() {
            let _ = fs::remove_dir_all(&dir);
        }

        fs::rename(&tmp_dir, &dir).map_err(|e| RecompressError::cache(e.to_string()))?;

        Ok(())
    }

    /// キャッシュから EncodedOutput を取得する。キャッシュミスの場合は None を返す。
    pub fn retrieve(&self, key: &str) -> crate::error::Result<Option<EncodedOutput>> {
        if !self.contains(key) {
            return Ok(None);
        }
        let dir = self.key_dir(key)?;

        let metadata_str = fs::read_to_string(dir.join("metadata.json"))
            .map_err(|e| RecompressError::cache(e.to_string()))?;
        let metadata: CacheMetadata = serde_json::from_str(&metadata_str)?;

        if metadata.cache_key != key {
            return Err(RecompressError::cache(format!(
                "cache key mismatch: expected '{}', found '{}'",
                key, metadata.cache_key
            )));
        }

        let data =
            fs::read(dir.join("payload.bin")).map_err(|e| RecompressError::cache(e.to_string()))?;

        Ok(Some(EncodedOutput {
            codec: metadata.codec,
            data,
            width: metadata.width,
            height: metadata.height,
            quality: metadata.quality,
            grayscale: metadata.grayscale,
            has_alpha: metadata.has_alpha,
            fallback_pixels: metadata.fallback_pixels,
        }))
    }

    /// キャッシュキーが存在し、必須ファイルが揃っているか確認する。
    pub fn contains(&self, key: &str) -> bool {
        match self.key_dir(key) {
            Ok(dir) => CACHE_FILES.iter().all(|f| dir.join(f).exists()),
            Err(_) => false,
        }
    }
}
