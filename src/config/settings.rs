use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::compositor::{DEFAULT_MARGIN_RATIO, DEFAULT_SCALE_DIVISOR};
use crate::decision::{DEFAULT_MIN_WORTHWHILE_BYTES, FilterRoutes};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: u8,
    pub target_dpi: f64,
    pub dpi_ceiling: f64,
    pub min_worthwhile_bytes: usize,
    pub force_gray: bool,
    pub only_if_smaller: bool,
    pub parallel_workers: usize,
    pub cache_dir: Option<PathBuf>,
    pub filter_routes: FilterRoutes,
    pub stamp_scale_divisor: f64,
    pub stamp_margin_ratio: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            quality: 75,
            target_dpi: 120.0,
            dpi_ceiling: 120.0,
            min_worthwhile_bytes: DEFAULT_MIN_WORTHWHILE_BYTES,
            force_gray: false,
            only_if_smaller: false,
            parallel_workers: 0,
            cache_dir: None,
            filter_routes: FilterRoutes::default(),
            stamp_scale_divisor: DEFAULT_SCALE_DIVISOR,
            stamp_margin_ratio: DEFAULT_MARGIN_RATIO,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::RecompressError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
