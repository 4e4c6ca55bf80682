// SHA-256（ピクセルバッファ + エンコード設定）
//
// Computes a cache key from the raw pixel buffer an image was decoded from
// and the parameters that shape its encoded output. The key is a SHA-256
// hash encoded as a lowercase hexadecimal string.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::raster::RawImageBuffer;

/// エンコード結果に影響する設定パラメータ。
///
/// キャッシュキー計算時にハッシュに含める設定値のみを保持する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSettings {
    pub quality: u8,
    pub force_gray: bool,
    /// 縮小する場合の (元DPI, 目標DPI)
    pub reduce: Option<(f64, f64)>,
}

/// 設定を正規化JSON形式に変換する（キーはアルファベット順で固定）。
fn settings_to_canonical_json(settings: &EncodeSettings) -> String {
    let mut map = BTreeMap::new();
    map.insert("force_gray", serde_json::json!(settings.force_gray));
    map.insert("quality", serde_json::json!(settings.quality));
    let reduce = settings
        .reduce
        .map(|(source, target)| serde_json::json!([source, target]))
        .unwrap_or(serde_json::Value::Null);
    map.insert("reduce", reduce);
    // BTreeMap<&str, Value> の直列化は失敗しない
    serde_json::to_string(&map).unwrap_or_default()
}

/// ピクセルバッファと設定からキャッシュキー（SHA-256ハッシュ）を計算する。
///
/// ハッシュ入力: `format || width || height || stride || data || settings_canonical_json`
pub fn compute_cache_key(buffer: &RawImageBuffer, settings: &EncodeSettings) -> String {
    let mut hasher = Sha256::new();
    hasher.update(buffer.format.name().as_bytes());
    hasher.update(buffer.width.to_le_bytes());
    hasher.update(buffer.height.to_le_bytes());
    hasher.update((buffer.stride as u64).to_le_bytes());
    hasher.update(&buffer.data);

    let settings_json = settings_to_canonical_json(settings);
    hasher.update(settings_json.as_bytes());

    hex::encode(hasher.finalize())
}
