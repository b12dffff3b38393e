use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use tex86_trend::config::AnalysisConfig;
use tex86_trend::data::{ExclusionWindow, UncertaintyFallback};
use tex86_trend::fit::WeightConvention;
use tex86_trend::pipeline::{run_analysis, AnalysisRun};
use tex86_trend::ImageFormat;

/// Rows echoed to the console before the fit results.
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Weighted TEX86 trend fits with a Monte Carlo slope ensemble"
)]
struct Cli {
    /// Input CSV with depth, TEX86 and TEX86 standard deviation columns
    #[arg(short, long)]
    input: PathBuf,

    /// TOML configuration; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output base directory; every run gets a timestamped subdirectory
    #[arg(short, long, default_value = "output-tex86-trend")]
    output: PathBuf,

    /// Monte Carlo iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Perturbation half-width as a multiple of each uncertainty
    #[arg(long)]
    scale: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Depth window removed before fitting, bounds inclusive
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        allow_negative_numbers = true,
        conflicts_with = "no_exclude"
    )]
    exclude: Option<Vec<f64>>,

    /// Keep every depth
    #[arg(long)]
    no_exclude: bool,

    /// Fixed uncertainty for rows without one, instead of the column mean
    #[arg(long)]
    fallback_stdev: Option<f64>,

    /// Weight applied to each observation in the weighted fit
    #[arg(long, value_enum)]
    weighting: Option<WeightConvention>,

    /// Image format for the figures
    #[arg(long, value_enum)]
    format: Option<ImageFormat>,

    /// Skip figure rendering
    #[arg(long)]
    no_plots: bool,
}

impl Cli {
    fn analysis_config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::from_toml_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };

        if let Some(v) = self.iterations {
            cfg.monte_carlo.iterations = v;
        }
        if let Some(v) = self.scale {
            cfg.monte_carlo.half_width_scale = v;
        }
        if let Some(v) = self.seed {
            cfg.monte_carlo.seed = Some(v);
        }
        if let Some(bounds) = &self.exclude {
            if let &[a, b] = bounds.as_slice() {
                cfg.exclude = Some(ExclusionWindow::new(a, b));
            }
        }
        if self.no_exclude {
            cfg.exclude = None;
        }
        if let Some(v) = self.fallback_stdev {
            cfg.fallback = UncertaintyFallback::Fixed(v);
        }
        if let Some(v) = self.weighting {
            cfg.weighting = v;
        }
        if let Some(v) = self.format {
            cfg.plot.format = v;
        }
        if self.no_plots {
            cfg.plot.render = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn print_report(run: &AnalysisRun) {
    let analysis = &run.analysis;
    let summary = &run.summary;

    println!(
        "{:>12} {:>10} {:>12}",
        summary.config.columns.position, summary.config.columns.value, summary.config.columns.uncertainty
    );
    for obs in analysis.observations.iter().take(PREVIEW_ROWS) {
        println!("{:>12.2} {:>10.4} {:>12.4}", obs.position, obs.value, obs.uncertainty);
    }
    println!(
        "Observations: {} used | {} excluded | {} incomplete",
        summary.counts.observations, summary.counts.rows_excluded, summary.counts.rows_incomplete
    );

    println!(
        "Unweighted fit: slope = {:.6e} | intercept = {:.6}",
        summary.ols.slope, summary.ols.intercept
    );
    println!(
        "Weighted fit ({}): slope = {:.6e} | intercept = {:.6}",
        summary.config.weighting.label(),
        summary.weighted.slope,
        summary.weighted.intercept
    );
    println!(
        "Average slope = {:.6e} +/- {:.6e}",
        summary.slopes.mean, summary.slopes.std_dev
    );
    println!(
        "Slope 95% interval: [{:.6e}, {:.6e}] | at or below zero: {:.1}%",
        summary.slopes.p2_5,
        summary.slopes.p97_5,
        summary.slopes.fraction_non_positive * 100.0
    );

    let outputs = &summary.outputs;
    println!("Run directory: {}", outputs.output_dir.display());
    println!("Observations CSV: {}", outputs.observations_path.display());
    println!("Samples: {}", outputs.samples_path.display());
    println!("Summary: {}", outputs.summary_path.display());
    for (name, path) in [
        ("Data plot", &outputs.plot_data_path),
        ("Models plot", &outputs.plot_models_path),
        ("Histogram plot", &outputs.plot_histograms_path),
    ] {
        if let Some(path) = path {
            println!("{name}: {}", path.display());
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = cli.analysis_config()?;

    let run = run_analysis(&cli.input, &cfg, &cli.output)?;
    print_report(&run);

    Ok(())
}
