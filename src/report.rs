//! Figure descriptions.
//!
//! Builders here only assemble series and styling from analysis results;
//! nothing is drawn. [`crate::render`] turns a description into an image.

use serde::Serialize;

use crate::config::PlotConfig;
use crate::data::ObservationSet;
use crate::fit::LinearFit;
use crate::monte_carlo::MonteCarloEnsemble;
use crate::stats::Histogram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const BLACK: Rgb = Rgb(0, 0, 0);
pub const GREY: Rgb = Rgb(128, 128, 128);
pub const PINK: Rgb = Rgb(255, 192, 203);
pub const PERU: Rgb = Rgb(205, 133, 63);
pub const MEDIUM_SLATE_BLUE: Rgb = Rgb(123, 104, 238);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineStyle {
    Solid,
    Dashed,
    DashDot,
}

impl LineStyle {
    /// Alternating on/off lengths as fractions of the line, starting "on".
    pub fn pattern(&self) -> &'static [f64] {
        match self {
            Self::Solid => &[1.0],
            Self::Dashed => &[0.025, 0.0125],
            Self::DashDot => &[0.025, 0.01, 0.004, 0.01],
        }
    }
}

/// The two deterministic fits every figure is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPair {
    pub unweighted: LinearFit,
    pub weighted: LinearFit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBarSeries {
    pub label: String,
    /// `(position, value, half error bar)`
    pub points: Vec<(f64, f64, f64)>,
    pub fill: Rgb,
    pub edge: Rgb,
    pub marker_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub label: Option<String>,
    pub points: Vec<(f64, f64)>,
    pub color: Rgb,
    /// Opacity in `[0, 1]`.
    pub alpha: f64,
    pub style: LineStyle,
    pub width: u32,
}

impl LineSeries {
    fn trend(label: &str, fit: &LinearFit, range: (f64, f64), style: LineStyle, color: Rgb) -> Self {
        Self {
            label: Some(label.to_string()),
            points: vec![(range.0, fit.predict(range.0)), (range.1, fit.predict(range.1))],
            color,
            alpha: 1.0,
            style,
            width: 2,
        }
    }
}

/// Scatter-with-lines figure in data coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XyFigure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data: ErrorBarSeries,
    /// Drawn in order, so later lines sit on top.
    pub lines: Vec<LineSeries>,
}

impl XyFigure {
    /// `(x_min, x_max, y_min, y_max)` covering error bars and every line.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut bounds = (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        );
        let mut include = |x: f64, y: f64| {
            bounds.0 = bounds.0.min(x);
            bounds.1 = bounds.1.max(x);
            bounds.2 = bounds.2.min(y);
            bounds.3 = bounds.3.max(y);
        };

        for &(x, y, err) in &self.data.points {
            include(x, y - err);
            include(x, y + err);
        }
        for line in &self.lines {
            for &(x, y) in &line.points {
                include(x, y);
            }
        }

        if bounds.0 > bounds.1 {
            return (0.0, 1.0, 0.0, 1.0);
        }
        bounds
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLine {
    pub label: String,
    pub x: f64,
    pub style: LineStyle,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramPanel {
    pub title: String,
    pub histogram: Histogram,
    pub fill: Rgb,
    pub edge: Rgb,
    pub references: Vec<ReferenceLine>,
}

impl HistogramPanel {
    /// Horizontal extent covering every bar and reference line.
    pub fn x_bounds(&self) -> (f64, f64) {
        let (lo, hi) = self.histogram.range();
        self.references
            .iter()
            .fold((lo, hi), |(lo, hi), r| (lo.min(r.x), hi.max(r.x)))
    }
}

/// Panels stacked vertically, top first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramFigure {
    pub panels: Vec<HistogramPanel>,
}

fn data_series(observations: &ObservationSet) -> ErrorBarSeries {
    ErrorBarSeries {
        label: "Data".to_string(),
        points: observations
            .iter()
            .map(|o| (o.position, o.value, o.uncertainty))
            .collect(),
        fill: PINK,
        edge: BLACK,
        marker_size: 6,
    }
}

fn trend_lines(trends: &TrendPair, range: (f64, f64), unweighted_color: Rgb) -> [LineSeries; 2] {
    [
        LineSeries::trend(
            "OLS Trend (no weights)",
            &trends.unweighted,
            range,
            LineStyle::Dashed,
            unweighted_color,
        ),
        LineSeries::trend(
            "OLS Trend (weighted)",
            &trends.weighted,
            range,
            LineStyle::DashDot,
            BLACK,
        ),
    ]
}

/// Observations with ±1σ error bars and both deterministic trends.
pub fn data_figure(observations: &ObservationSet, trends: &TrendPair, plot: &PlotConfig) -> XyFigure {
    let range = observations.position_range().unwrap_or((0.0, 1.0));
    XyFigure {
        title: "Weighted and unweighted trends".to_string(),
        x_label: plot.x_label.clone(),
        y_label: plot.y_label.clone(),
        data: data_series(observations),
        lines: trend_lines(trends, range, GREY).into(),
    }
}

/// Every Monte Carlo model in grey, deterministic trends on top.
pub fn ensemble_figure(
    observations: &ObservationSet,
    ensemble: &MonteCarloEnsemble,
    trends: &TrendPair,
    plot: &PlotConfig,
) -> XyFigure {
    let positions = observations.positions();
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));

    let mut lines: Vec<LineSeries> = ensemble
        .models
        .iter()
        .enumerate()
        .map(|(k, model)| LineSeries {
            label: (k == 0).then(|| format!("Monte Carlo models (n = {})", ensemble.len())),
            points: order.iter().map(|&i| (positions[i], model[i])).collect(),
            color: GREY,
            alpha: 0.25,
            style: LineStyle::Solid,
            width: 1,
        })
        .collect();

    let range = observations.position_range().unwrap_or((0.0, 1.0));
    lines.extend(trend_lines(trends, range, BLACK));

    XyFigure {
        title: "Monte Carlo models".to_string(),
        x_label: plot.x_label.clone(),
        y_label: plot.y_label.clone(),
        data: data_series(observations),
        lines,
    }
}

/// Slope and intercept histograms with the deterministic fits marked.
pub fn histogram_figure(ensemble: &MonteCarloEnsemble, trends: &TrendPair, bins: usize) -> HistogramFigure {
    let references = |pick: fn(&LinearFit) -> f64| {
        vec![
            ReferenceLine {
                label: "OLS (no weights)".to_string(),
                x: pick(&trends.unweighted),
                style: LineStyle::Dashed,
                color: BLACK,
            },
            ReferenceLine {
                label: "OLS (weighted)".to_string(),
                x: pick(&trends.weighted),
                style: LineStyle::DashDot,
                color: BLACK,
            },
        ]
    };

    HistogramFigure {
        panels: vec![
            HistogramPanel {
                title: "Slopes".to_string(),
                histogram: Histogram::from_samples(&ensemble.slopes, bins),
                fill: PERU,
                edge: BLACK,
                references: references(|fit| fit.slope),
            },
            HistogramPanel {
                title: "Intercepts".to_string(),
                histogram: Histogram::from_samples(&ensemble.intercepts, bins),
                fill: MEDIUM_SLATE_BLUE,
                edge: BLACK,
                references: references(|fit| fit.intercept),
            },
        ],
    }
}
