//! TEX86 trend significance
//!
//! Ordinary and uncertainty-weighted least squares fits of a proxy index
//! against depth, plus a Monte Carlo ensemble that perturbs each observation
//! inside its uncertainty window and refits, so the spread of sampled slopes
//! can be compared against a flat trend.

pub mod config;
pub mod data;
pub mod fit;
pub mod monte_carlo;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod stats;

use thiserror::Error;

// Re-export main types
pub use config::{AnalysisConfig, ColumnNames, ImageFormat};
pub use data::{ExclusionWindow, Observation, ObservationSet, RawRecord, UncertaintyFallback};
pub use fit::{fit_ols, fit_weighted, LinearFit, WeightConvention};
pub use monte_carlo::{run_monte_carlo, MonteCarloConfig, MonteCarloEnsemble};
pub use output::{OutputFiles, RunSummary};
pub use pipeline::{analyze, run_analysis, Analysis, AnalysisRun};
pub use stats::{EnsembleSummary, Histogram};

#[derive(Debug, Error)]
pub enum TrendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing column `{0}` in input header")]
    MissingColumn(String),
    #[error("row {row}: column `{column}` holds non-numeric value `{value}`")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("observation {index}: uncertainty must be positive and finite, got {value}")]
    InvalidUncertainty { index: usize, value: f64 },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("at least 2 observations are required for a linear fit, got {0}")]
    TooFewObservations(usize),
    #[error("singular design matrix: positions do not span a line")]
    SingularDesign,
    #[error("no positive uncertainty available to compute a fallback")]
    NoUncertaintyFallback,
    #[error("monte carlo iteration count must be greater than zero")]
    ZeroIterations,
}

pub(crate) fn ensure_len(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), TrendError> {
    if expected == actual {
        return Ok(());
    }

    Err(TrendError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}
