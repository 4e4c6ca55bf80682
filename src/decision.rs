// Recompression decision engine.
//
// Per image: Skip with a reason code, or Process with an extraction mode and
// an optional density reduction. The filter -> route mapping is data
// (`FilterRoutes`) and can be overridden from settings.yaml.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Threshold below which a stream is not worth recompressing.
pub const DEFAULT_MIN_WORTHWHILE_BYTES: usize = 1000;

/// Routing table key used for streams without a filter.
pub const NO_FILTER_KEY: &str = "none";

/// How the pixels of an image object are obtained from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// The object's stored bitmap.
    Direct,
    /// A backend-composited bitmap (soft mask applied).
    Rendered,
}

impl ExtractionMode {
    pub fn name(self) -> &'static str {
        match self {
            ExtractionMode::Direct => "direct",
            ExtractionMode::Rendered => "rendered",
        }
    }
}

/// Routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRoute {
    Direct,
    Rendered,
    /// Already optimal for its content (bitonal fax); never touched.
    Preserve,
}

/// Filter tag -> route. Filters missing from the table are unsupported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterRoutes(BTreeMap<String, FilterRoute>);

impl Default for FilterRoutes {
    fn default() -> Self {
        let table = [
            ("DCTDecode", FilterRoute::Direct),
            ("DCT", FilterRoute::Direct),
            ("JBIG2Decode", FilterRoute::Direct),
            (NO_FILTER_KEY, FilterRoute::Direct),
            ("FlateDecode", FilterRoute::Rendered),
            ("Fl", FilterRoute::Rendered),
            ("CCITTFaxDecode", FilterRoute::Preserve),
            ("CCF", FilterRoute::Preserve),
        ];
        FilterRoutes(
            table
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl FilterRoutes {
    /// Route for the first filter tag of a chain; `None` means no filter.
    pub fn route(&self, filter: Option<&str>) -> Option<FilterRoute> {
        let key = match filter {
            Some(f) if !f.is_empty() => f,
            _ => NO_FILTER_KEY,
        };
        self.0.get(key).copied()
    }

    pub fn set(&mut self, filter: impl Into<String>, route: FilterRoute) {
        self.0.insert(filter.into(), route);
    }
}

/// Why an image was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooSmall { bytes: usize, threshold: usize },
    BitonalPreserved { filter: String },
    UnsupportedFilter { filter: String },
    /// The backend could not produce pixels for the object (stencil mask,
    /// undecodable filter, exotic colour space).
    UnsupportedFormat { detail: String },
}

impl SkipReason {
    /// Stable reason code for reports and statistics.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::TooSmall { .. } => "too-small",
            SkipReason::BitonalPreserved { .. } => "bitonal-preserved",
            SkipReason::UnsupportedFilter { .. } => "unsupported-filter",
            SkipReason::UnsupportedFormat { .. } => "unsupported-format",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooSmall { bytes, threshold } => {
                write!(f, "too-small ({bytes} bytes < {threshold})")
            }
            SkipReason::BitonalPreserved { filter } => write!(f, "bitonal-preserved ({filter})"),
            SkipReason::UnsupportedFilter { filter } => write!(f, "unsupported-filter ({filter})"),
            SkipReason::UnsupportedFormat { detail } => write!(f, "unsupported-format ({detail})"),
        }
    }
}

/// Image metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub horizontal_dpi: f64,
    pub vertical_dpi: f64,
    pub color_space: String,
    pub bits_per_pixel: u32,
}

/// Source and target density for a reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityHint {
    pub source_dpi: f64,
    pub target_dpi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessPlan {
    pub mode: ExtractionMode,
    pub reduce: Option<DensityHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skip(SkipReason),
    Process(ProcessPlan),
}

/// Thresholds and routing consulted by [`decide`].
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub min_worthwhile_bytes: usize,
    /// Reduce when the horizontal density exceeds this.
    pub dpi_ceiling: f64,
    pub target_dpi: f64,
    pub routes: FilterRoutes,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_worthwhile_bytes: DEFAULT_MIN_WORTHWHILE_BYTES,
            dpi_ceiling: 120.0,
            target_dpi: 120.0,
            routes: FilterRoutes::default(),
        }
    }
}

/// Decide what to do with one image.
///
/// The size check runs before the filter lookup, so a tiny stream is
/// `too-small` whatever its filter.
pub fn decide(
    source_filter: Option<&str>,
    raw_len: usize,
    meta: &ImageMetadata,
    config: &DecisionConfig,
) -> Outcome {
    let outcome = decide_inner(source_filter, raw_len, meta, config);
    debug!(
        filter = source_filter.unwrap_or(NO_FILTER_KEY),
        raw_len,
        dpi = meta.horizontal_dpi,
        ?outcome,
        "image decision"
    );
    outcome
}

fn decide_inner(
    source_filter: Option<&str>,
    raw_len: usize,
    meta: &ImageMetadata,
    config: &DecisionConfig,
) -> Outcome {
    if raw_len < config.min_worthwhile_bytes {
        return Outcome::Skip(SkipReason::TooSmall {
            bytes: raw_len,
            threshold: config.min_worthwhile_bytes,
        });
    }

    let filter_name = source_filter.unwrap_or(NO_FILTER_KEY).to_string();
    let mode = match config.routes.route(source_filter) {
        Some(FilterRoute::Direct) => ExtractionMode::Direct,
        Some(FilterRoute::Rendered) => ExtractionMode::Rendered,
        Some(FilterRoute::Preserve) => {
            return Outcome::Skip(SkipReason::BitonalPreserved {
                filter: filter_name,
            });
        }
        None => {
            return Outcome::Skip(SkipReason::UnsupportedFilter {
                filter: filter_name,
            });
        }
    };

    let reduce = (meta.horizontal_dpi > config.dpi_ceiling).then_some(DensityHint {
        source_dpi: meta.horizontal_dpi,
        target_dpi: config.target_dpi,
    });

    Outcome::Process(ProcessPlan { mode, reduce })
}
