use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::report::{HistogramFigure, HistogramPanel, LineStyle, Rgb, XyFigure};

/// Fraction of the data span added on each side of a chart.
const PADDING: f64 = 0.05;

fn color(rgb: Rgb) -> RGBColor {
    RGBColor(rgb.0, rgb.1, rgb.2)
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    let pad = if span > 0.0 { span * PADDING } else { lo.abs().max(1.0) * PADDING };
    (lo - pad, hi + pad)
}

/// Splits a straight segment into the visible pieces of a dash pattern.
pub(crate) fn pattern_segments(
    from: (f64, f64),
    to: (f64, f64),
    pattern: &[f64],
) -> Vec<[(f64, f64); 2]> {
    let lerp = |t: f64| (from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t);
    if pattern.len() < 2 {
        return vec![[from, to]];
    }

    let mut segments = Vec::new();
    let mut t = 0.0;
    let mut idx = 0;
    while t < 1.0 {
        let end = (t + pattern[idx % pattern.len()]).min(1.0);
        if idx % 2 == 0 {
            segments.push([lerp(t), lerp(end)]);
        }
        t = end;
        idx += 1;
    }
    segments
}

fn styled_path(points: &[(f64, f64)], style: LineStyle) -> Vec<Vec<(f64, f64)>> {
    if style == LineStyle::Solid {
        return vec![points.to_vec()];
    }

    points
        .windows(2)
        .flat_map(|w| pattern_segments(w[0], w[1], style.pattern()))
        .map(|segment| segment.to_vec())
        .collect()
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Draws a scatter-with-lines figure, SVG or PNG by file extension.
pub fn render_xy(figure: &XyFigure, path: &Path, size: (u32, u32)) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let result = match extension(path)?.as_str() {
        "svg" => draw_xy(SVGBackend::new(path, size).into_drawing_area(), figure),
        _ => draw_xy(BitMapBackend::new(path, size).into_drawing_area(), figure),
    };
    result.with_context(|| format!("failed to render {}", path.display()))
}

/// Draws stacked histogram panels, SVG or PNG by file extension.
pub fn render_histograms(
    figure: &HistogramFigure,
    path: &Path,
    size: (u32, u32),
) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let result = match extension(path)?.as_str() {
        "svg" => draw_histograms(SVGBackend::new(path, size).into_drawing_area(), figure),
        _ => draw_histograms(BitMapBackend::new(path, size).into_drawing_area(), figure),
    };
    result.with_context(|| format!("failed to render {}", path.display()))
}

fn extension(path: &Path) -> anyhow::Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "svg" | "png" => Ok(ext),
        other => bail!("unsupported image extension: .{other}"),
    }
}

fn draw_xy<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    figure: &XyFigure,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let (x0, x1, y0, y1) = figure.bounds();
    let (x0, x1) = padded(x0, x1);
    let (y0, y1) = padded(y0, y1);

    let mut chart = ChartBuilder::on(&root)
        .caption(&figure.title, ("sans-serif", 28).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(figure.x_label.as_str())
        .y_desc(figure.y_label.as_str())
        .draw()?;

    for line in &figure.lines {
        let (rgb, alpha, width) = (color(line.color), line.alpha, line.width);
        let series = chart.draw_series(
            styled_path(&line.points, line.style)
                .into_iter()
                .map(move |path| PathElement::new(path, rgb.mix(alpha).stroke_width(width))),
        )?;
        if let Some(label) = &line.label {
            series.label(label.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 25, y)], rgb.mix(alpha).stroke_width(width))
            });
        }
    }

    let data = &figure.data;
    let edge = color(data.edge);
    let fill = color(data.fill);
    chart.draw_series(data.points.iter().map(|&(x, y, err)| {
        ErrorBar::new_vertical(x, y - err, y, y + err, edge.stroke_width(1), 8)
    }))?;
    chart
        .draw_series(
            data.points
                .iter()
                .map(|&(x, y, _)| Circle::new((x, y), data.marker_size, fill.filled())),
        )?
        .label(data.label.as_str())
        .legend(move |(x, y)| Circle::new((x + 12, y), 5, fill.filled()));
    chart.draw_series(
        data.points
            .iter()
            .map(|&(x, y, _)| Circle::new((x, y), data.marker_size, edge.stroke_width(1))),
    )?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_histograms<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    figure: &HistogramFigure,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let rows = figure.panels.len().max(1);
    let areas = root.split_evenly((rows, 1));
    for (area, panel) in areas.iter().zip(&figure.panels) {
        draw_histogram_panel(area, panel)?;
    }

    root.present()?;
    Ok(())
}

fn draw_histogram_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &HistogramPanel,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let (x0, x1) = panel.x_bounds();
    let (x0, x1) = padded(x0, x1);
    let y1 = (panel.histogram.max_count().max(1) as f64) * 1.1;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, 0.0..y1)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_desc("Count")
        .draw()?;

    let fill = color(panel.fill);
    let edge = color(panel.edge);
    chart.draw_series(
        panel
            .histogram
            .bars()
            .map(|(l, r, count)| Rectangle::new([(l, 0.0), (r, count as f64)], fill.filled())),
    )?;
    chart.draw_series(
        panel
            .histogram
            .bars()
            .map(|(l, r, count)| Rectangle::new([(l, 0.0), (r, count as f64)], edge.stroke_width(1))),
    )?;

    for reference in &panel.references {
        let rgb = color(reference.color);
        let path = [(reference.x, 0.0), (reference.x, y1)];
        chart
            .draw_series(
                styled_path(&path, reference.style)
                    .into_iter()
                    .map(move |p| PathElement::new(p, rgb.stroke_width(2))),
            )?
            .label(reference.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], rgb.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;

    Ok(())
}
