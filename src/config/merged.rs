use std::path::PathBuf;

use super::job::Job;
use super::settings::Settings;
use crate::decision::{DecisionConfig, FilterRoutes};
use crate::error::RecompressError;
use crate::raster::encoder::validate_quality;

#[derive(Debug, Clone)]
pub struct MergedConfig {
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

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        MergedConfig {
            quality: job.quality.unwrap_or(settings.quality),
            target_dpi: job.target_dpi.unwrap_or(settings.target_dpi),
            dpi_ceiling: job.dpi_ceiling.unwrap_or(settings.dpi_ceiling),
            min_worthwhile_bytes: settings.min_worthwhile_bytes,
            force_gray: job.force_gray.unwrap_or(settings.force_gray),
            only_if_smaller: job.only_if_smaller.unwrap_or(settings.only_if_smaller),
            parallel_workers: settings.parallel_workers,
            cache_dir: settings.cache_dir.clone(),
            filter_routes: settings.filter_routes.clone(),
            stamp_scale_divisor: settings.stamp_scale_divisor,
            stamp_margin_ratio: settings.stamp_margin_ratio,
        }
    }

    /// 値の妥当性を検証する。
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_quality(self.quality)
            .map_err(|e| RecompressError::config(e.to_string()))?;

        let positive = [
            ("target_dpi", self.target_dpi),
            ("dpi_ceiling", self.dpi_ceiling),
            ("stamp_scale_divisor", self.stamp_scale_divisor),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(RecompressError::config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !self.stamp_margin_ratio.is_finite() || self.stamp_margin_ratio < 0.0 {
            return Err(RecompressError::config(format!(
                "stamp_margin_ratio must not be negative, got {}",
                self.stamp_margin_ratio
            )));
        }
        Ok(())
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            min_worthwhile_bytes: self.min_worthwhile_bytes,
            dpi_ceiling: self.dpi_ceiling,
            target_dpi: self.target_dpi,
            routes: self.filter_routes.clone(),
        }
    }
}
