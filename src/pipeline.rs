//! Load, fit, resample, report.

use std::path::Path;

use anyhow::Context;

use crate::config::AnalysisConfig;
use crate::data::{impute_uncertainty, load_csv, ObservationSet, RawRecord};
use crate::fit::{fit_ols, fit_weighted};
use crate::monte_carlo::MonteCarloEnsemble;
use crate::output::{
    create_timestamped_run_dir, write_observations_csv, write_samples_csv, write_summary,
    DatasetCounts, OutputFiles, RunSummary,
};
use crate::render::{render_histograms, render_xy};
use crate::report::{data_figure, ensemble_figure, histogram_figure, TrendPair};
use crate::stats::EnsembleSummary;
use crate::TrendError;

/// Observations after imputation and exclusion, with bookkeeping.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub observations: ObservationSet,
    pub fallback_uncertainty: f64,
    pub counts: DatasetCounts,
}

/// Everything computed from one observation set.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub observations: ObservationSet,
    pub trends: TrendPair,
    pub ensemble: MonteCarloEnsemble,
    pub slopes: EnsembleSummary,
    pub intercepts: EnsembleSummary,
}

#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub analysis: Analysis,
    pub summary: RunSummary,
}

pub fn prepare(records: &[RawRecord], config: &AnalysisConfig) -> Result<PreparedData, TrendError> {
    let fallback_uncertainty = config.fallback.resolve(records)?;
    let imputed = impute_uncertainty(records, config.fallback)?;

    let observations = match &config.exclude {
        Some(window) => imputed.exclude(window),
        None => imputed.clone(),
    };

    let counts = DatasetCounts {
        rows_read: records.len(),
        rows_incomplete: records.len() - imputed.len(),
        rows_excluded: imputed.len() - observations.len(),
        observations: observations.len(),
    };
    log::info!(
        "{} observations kept ({} excluded by window, {} incomplete)",
        counts.observations,
        counts.rows_excluded,
        counts.rows_incomplete
    );

    Ok(PreparedData {
        observations,
        fallback_uncertainty,
        counts,
    })
}

pub fn analyze(observations: ObservationSet, config: &AnalysisConfig) -> Result<Analysis, TrendError> {
    config.validate()?;

    let positions = observations.positions();
    let values = observations.values();
    let unweighted = fit_ols(positions, values)?;
    let weighted = fit_weighted(positions, values, observations.uncertainties(), config.weighting)?;
    log::info!(
        "OLS slope {:.6e} intercept {:.6}; weighted ({}) slope {:.6e} intercept {:.6}",
        unweighted.slope,
        unweighted.intercept,
        config.weighting.label(),
        weighted.slope,
        weighted.intercept
    );

    let ensemble = config.monte_carlo.run(&observations)?;
    let slopes = EnsembleSummary::from_samples(&ensemble.slopes).ok_or(TrendError::ZeroIterations)?;
    let intercepts =
        EnsembleSummary::from_samples(&ensemble.intercepts).ok_or(TrendError::ZeroIterations)?;
    log::info!(
        "monte carlo slope {:.6e} +/- {:.6e} over {} iterations",
        slopes.mean,
        slopes.std_dev,
        slopes.count
    );

    Ok(Analysis {
        observations,
        trends: TrendPair {
            unweighted,
            weighted,
        },
        ensemble,
        slopes,
        intercepts,
    })
}

/// Full run: read `input`, analyse, write artifacts under a fresh
/// timestamped directory in `output_base`.
pub fn run_analysis(
    input: &Path,
    config: &AnalysisConfig,
    output_base: &Path,
) -> anyhow::Result<AnalysisRun> {
    config.validate()?;

    let records = load_csv(input, &config.columns)
        .with_context(|| format!("failed to load observations from {}", input.display()))?;
    let prepared = prepare(&records, config)?;
    let analysis = analyze(prepared.observations, config)?;

    let output_dir = create_timestamped_run_dir(output_base)?;
    let plot_extension = config.plot.render.then(|| config.plot.format.extension());
    let files = OutputFiles::in_dir(&output_dir, plot_extension);

    write_observations_csv(&files.observations_path, &analysis.observations)
        .with_context(|| format!("failed to write {}", files.observations_path.display()))?;
    write_samples_csv(&files.samples_path, &analysis.ensemble)
        .with_context(|| format!("failed to write {}", files.samples_path.display()))?;
    render_figures(&analysis, config, &files)?;

    let summary = RunSummary {
        config: config.clone(),
        fallback_uncertainty: prepared.fallback_uncertainty,
        counts: prepared.counts,
        ols: analysis.trends.unweighted,
        weighted: analysis.trends.weighted,
        slopes: analysis.slopes,
        intercepts: analysis.intercepts,
        outputs: files,
    };
    write_summary(&summary.outputs.summary_path, &summary)
        .with_context(|| format!("failed to write {}", summary.outputs.summary_path.display()))?;

    Ok(AnalysisRun { analysis, summary })
}

fn render_figures(analysis: &Analysis, config: &AnalysisConfig, files: &OutputFiles) -> anyhow::Result<()> {
    let size = (config.plot.width, config.plot.height);

    if let Some(path) = &files.plot_data_path {
        let figure = data_figure(&analysis.observations, &analysis.trends, &config.plot);
        render_xy(&figure, path, size)?;
    }
    if let Some(path) = &files.plot_models_path {
        let figure = ensemble_figure(
            &analysis.observations,
            &analysis.ensemble,
            &analysis.trends,
            &config.plot,
        );
        render_xy(&figure, path, size)?;
    }
    if let Some(path) = &files.plot_histograms_path {
        let figure = histogram_figure(&analysis.ensemble, &analysis.trends, config.histogram_bins);
        render_histograms(&figure, path, (config.plot.width, config.plot.height * 3 / 2))?;
    }

    Ok(())
}
