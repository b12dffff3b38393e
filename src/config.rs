use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::{ExclusionWindow, UncertaintyFallback};
use crate::fit::WeightConvention;
use crate::monte_carlo::MonteCarloConfig;
use crate::stats::DEFAULT_HISTOGRAM_BINS;
use crate::TrendError;

pub use crate::data::ColumnNames;

/// Depth interval (cm composite depth) left out of the published regression.
pub const DEFAULT_EXCLUSION: ExclusionWindow = ExclusionWindow {
    min: 19.0,
    max: 100.0,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

/// Figure layout and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub render: bool,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub x_label: String,
    pub y_label: String,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            render: true,
            format: ImageFormat::Svg,
            width: 1024,
            height: 768,
            x_label: "Depth [cmcd]".to_string(),
            y_label: "TEX86 Index".to_string(),
        }
    }
}

/// Full analysis configuration, loadable from TOML. Missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub columns: ColumnNames,
    pub exclude: Option<ExclusionWindow>,
    pub fallback: UncertaintyFallback,
    pub weighting: WeightConvention,
    pub monte_carlo: MonteCarloConfig,
    pub histogram_bins: usize,
    pub plot: PlotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            exclude: Some(DEFAULT_EXCLUSION),
            fallback: UncertaintyFallback::MeanOfPresent,
            weighting: WeightConvention::InverseStdDev,
            monte_carlo: MonteCarloConfig::default(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            plot: PlotConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, TrendError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, TrendError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), TrendError> {
        self.monte_carlo.validate()?;

        if let UncertaintyFallback::Fixed(value) = self.fallback {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrendError::InvalidConfig(format!(
                    "fixed uncertainty fallback must be positive and finite, got {value}"
                )));
            }
        }

        if let Some(window) = self.exclude {
            if !(window.min.is_finite() && window.max.is_finite()) {
                return Err(TrendError::InvalidConfig(
                    "exclusion window bounds must be finite".to_string(),
                ));
            }
        }

        if self.histogram_bins == 0 {
            return Err(TrendError::InvalidConfig(
                "histogram_bins must be greater than zero".to_string(),
            ));
        }

        if self.plot.width == 0 || self.plot.height == 0 {
            return Err(TrendError::InvalidConfig(
                "plot width and height must be greater than zero".to_string(),
            ));
        }

        let columns = [
            &self.columns.position,
            &self.columns.value,
            &self.columns.uncertainty,
        ];
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(TrendError::InvalidConfig(
                "column names must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
