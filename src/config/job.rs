use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    /// 省略時は `<stem>-compress-<quality>-<dpi>dpi.pdf`
    pub output: Option<String>,
    /// 処理対象ページ。省略時は全ページ。
    #[serde(default, deserialize_with = "deserialize_pages")]
    pub pages: Option<Vec<u32>>,
    pub quality: Option<u8>,
    pub target_dpi: Option<f64>,
    pub dpi_ceiling: Option<f64>,
    pub force_gray: Option<bool>,
    pub only_if_smaller: Option<bool>,
    /// ロゴ画像 (PNG/JPEG) のパス
    pub stamp: Option<String>,
    /// 画像の書き出し先ディレクトリ
    pub extract_dir: Option<String>,
}

/// ページ範囲文字列をパースしてページ番号のベクタに変換する。
///
/// 形式:
/// - 単一ページ: `"5"`
/// - 範囲: `"5-10"` (5, 6, 7, 8, 9, 10)
/// - 混合（カンマ区切り）: `"1, 3, 5-10, 15"`
///
/// 結果はソート済み・重複なし。
pub fn parse_page_range(s: &str) -> crate::error::Result<Vec<u32>> {
    use crate::error::RecompressError;

    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(RecompressError::config("Page range cannot be empty"));
    }

    let parse_page = |text: &str| -> crate::error::Result<u32> {
        let page: u32 = text
            .trim()
            .parse()
            .map_err(|_| RecompressError::config(format!("Invalid page number: '{text}'")))?;
        if page == 0 {
            return Err(RecompressError::config("Page numbers start at 1"));
        }
        Ok(page)
    };

    let mut pages = Vec::new();

    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = parse_page(start_str)?;
            let end = parse_page(end_str)?;

            if start > end {
                return Err(RecompressError::config(format!(
                    "Invalid page range: start ({start}) > end ({end})"
                )));
            }

            pages.extend(start..=end);
        } else {
            pages.push(parse_page(part)?);
        }
    }

    if pages.is_empty() {
        return Err(RecompressError::config("Page range resolved to empty set"));
    }

    pages.sort();
    pages.dedup();
    Ok(pages)
}

/// serdeのdeserialize_withで使用するページ範囲デシリアライザ
///
/// YAMLでは文字列 (`"1-3, 7"`) と単一の整数 (`5`) の両方を受け付ける。
fn deserialize_pages<'de, D>(deserializer: D) -> Result<Option<Vec<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PagesField {
        Number(u32),
        Text(String),
    }

    match Option::<PagesField>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PagesField::Number(n)) => parse_page_range(&n.to_string())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(PagesField::Text(s)) => parse_page_range(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
