use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::data::ObservationSet;
use crate::fit::LinearFit;
use crate::monte_carlo::MonteCarloEnsemble;
use crate::stats::EnsembleSummary;
use crate::TrendError;

#[derive(Debug, Clone, Serialize)]
pub struct SampleRow {
    pub iteration: usize,
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DatasetCounts {
    /// Rows read from the input file.
    pub rows_read: usize,
    /// Rows dropped for a missing position or value.
    pub rows_incomplete: usize,
    /// Rows removed by the exclusion window.
    pub rows_excluded: usize,
    /// Observations entering every fit.
    pub observations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFiles {
    pub output_dir: PathBuf,
    pub observations_path: PathBuf,
    pub samples_path: PathBuf,
    pub summary_path: PathBuf,
    pub plot_data_path: Option<PathBuf>,
    pub plot_models_path: Option<PathBuf>,
    pub plot_histograms_path: Option<PathBuf>,
}

impl OutputFiles {
    pub fn in_dir(output_dir: &Path, plot_extension: Option<&str>) -> Self {
        let plot = |stem: &str| plot_extension.map(|ext| output_dir.join(format!("{stem}.{ext}")));
        Self {
            output_dir: output_dir.to_path_buf(),
            observations_path: output_dir.join("observations.csv"),
            samples_path: output_dir.join("monte_carlo_samples.csv"),
            summary_path: output_dir.join("summary.json"),
            plot_data_path: plot("data_trends"),
            plot_models_path: plot("all_models"),
            plot_histograms_path: plot("histograms"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub config: AnalysisConfig,
    /// Uncertainty substituted for missing or non-positive entries.
    pub fallback_uncertainty: f64,
    pub counts: DatasetCounts,
    pub ols: LinearFit,
    pub weighted: LinearFit,
    pub slopes: EnsembleSummary,
    pub intercepts: EnsembleSummary,
    pub outputs: OutputFiles,
}

pub fn write_observations_csv(path: &Path, observations: &ObservationSet) -> Result<(), TrendError> {
    let mut writer = csv::Writer::from_path(path)?;
    for observation in observations.iter() {
        writer.serialize(observation)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_samples_csv(path: &Path, ensemble: &MonteCarloEnsemble) -> Result<(), TrendError> {
    let mut writer = csv::Writer::from_path(path)?;
    for (iteration, fit) in ensemble.fits().enumerate() {
        writer.serialize(SampleRow {
            iteration,
            slope: fit.slope,
            intercept: fit.intercept,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), TrendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(summary)?;
    fs::write(path, data)?;
    Ok(())
}

/// Creates `<base>/<YYYYMMDD-HHMMSS>`, adding `-NN` when that already exists.
pub fn create_timestamped_run_dir(base_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(base_dir)
        .with_context(|| format!("failed to create output base directory {}", base_dir.display()))?;

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let run_dir = base_dir.join(&timestamp);
    if !run_dir.exists() {
        fs::create_dir_all(&run_dir)?;
        return Ok(run_dir);
    }

    let mut counter: usize = 1;
    loop {
        let candidate = base_dir.join(format!("{timestamp}-{counter:02}"));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)?;
            return Ok(candidate);
        }
        counter += 1;
    }
}
