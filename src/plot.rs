//! Chart generation for selected fsysinfo series.

use crate::fsysinfo::SampleSet;
use anyhow::{Context, Result};
use num_format::{Locale, ToFormattedString};
use plotters::coord::ranged1d::{Ranged, ValueFormatter};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::cartesian::Cartesian2d;
use plotters::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

const CHART_SIZE: (u32, u32) = (1200, 600);
const CHART_TITLE: &str = "fsysinfo_plot";

/// How the selected series are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartKind {
    /// One line per key
    #[default]
    Lines,
    /// Series layered cumulatively as filled areas
    Stacked,
}

/// Corner the legend is drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegendCorner {
    #[default]
    TopLeft,
    TopRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YScale {
    #[default]
    Linear,
    Log,
}

/// Display options for one chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChartStyle {
    pub kind: ChartKind,
    pub legend: LegendCorner,
    pub scale: YScale,
}

impl LegendCorner {
    fn position(self) -> SeriesLabelPosition {
        match self {
            LegendCorner::TopLeft => SeriesLabelPosition::UpperLeft,
            LegendCorner::TopRight => SeriesLabelPosition::UpperRight,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    #[error("no such key: {0}")]
    UnknownKey(String),

    #[error("no keys given to plot (list them after `--`)")]
    NoKeys,
}

/// A requested series, clipped to the common plot length
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Selected<'a> {
    pub key: &'a str,
    pub values: &'a [f64],
}

/// Look up every requested key and clip all of them to the shortest one.
///
/// Fails on the first key missing from `samples`, before anything is drawn.
pub fn select_series<'a>(
    samples: &'a SampleSet<f64>,
    keys: &'a [String],
) -> Result<Vec<Selected<'a>>, SelectError> {
    if keys.is_empty() {
        return Err(SelectError::NoKeys);
    }

    let found = keys
        .iter()
        .map(|key| {
            samples
                .get(key)
                .map(|values| (key.as_str(), values))
                .ok_or_else(|| SelectError::UnknownKey(key.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let min_len = found.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
    Ok(found
        .into_iter()
        .map(|(key, values)| Selected {
            key,
            values: &values[..min_len],
        })
        .collect())
}

/// Running totals of the selected series, bottom layer first
pub fn stack_layers(selected: &[Selected<'_>]) -> Vec<Vec<f64>> {
    let mut layers: Vec<Vec<f64>> = Vec::with_capacity(selected.len());
    for series in selected {
        let layer = match layers.last() {
            Some(below) => below
                .iter()
                .zip(series.values)
                .map(|(b, v)| b + v)
                .collect(),
            None => series.values.to_vec(),
        };
        layers.push(layer);
    }
    layers
}

/// Y-axis bounds covering every plotted value
fn value_bounds(values: impl Iterator<Item = f64>, scale: YScale) -> (f64, f64) {
    match scale {
        YScale::Linear => {
            let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if !lo.is_finite() || !hi.is_finite() {
                return (0.0, 1.0);
            }
            let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
            (lo - pad, hi + pad)
        }
        YScale::Log => {
            let (lo, hi) = values
                .filter(|v| *v > 0.0)
                .fold((f64::INFINITY, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let lo = if lo.is_finite() { lo } else { 1.0 };
            let hi = if hi > lo { hi * 1.1 } else { lo * 10.0 };
            (lo, hi)
        }
    }
}

/// Format Y-axis labels with thousands separators
fn format_value(v: &f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        (*v as i64).to_formatted_string(&Locale::en)
    } else {
        format!("{:.2}", v)
    }
}

/// Render the selected series as an SVG chart
pub fn render_svg<P: AsRef<Path>>(
    selected: &[Selected<'_>],
    style: &ChartStyle,
    path: P,
) -> Result<()> {
    let len = selected.first().map(|s| s.values.len()).unwrap_or(0);
    let max_x = len.saturating_sub(1).max(1) as f64;

    let layers: Vec<Vec<f64>> = match style.kind {
        ChartKind::Lines => selected.iter().map(|s| s.values.to_vec()).collect(),
        ChartKind::Stacked => stack_layers(selected),
    };
    let baseline = match style.kind {
        ChartKind::Lines => None,
        ChartKind::Stacked => Some(0.0),
    };
    let (min_y, max_y) = value_bounds(
        layers.iter().flatten().copied().chain(baseline),
        style.scale,
    );

    let root = SVGBackend::new(path.as_ref(), CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder
        .caption(CHART_TITLE, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(80);

    match style.scale {
        YScale::Linear => {
            let mut chart = builder.build_cartesian_2d(0f64..max_x, min_y..max_y)?;
            draw_chart(&mut chart, selected, &layers, 0.0, style)?;
        }
        YScale::Log => {
            // Stacked areas rest on the axis floor since log(0) is unbounded
            let mut chart =
                builder.build_cartesian_2d(0f64..max_x, (min_y..max_y).log_scale())?;
            draw_chart(&mut chart, selected, &layers, min_y, style)?;
        }
    }

    root.present()?;
    Ok(())
}

/// Draw mesh, series and legend onto a chart with either Y scale
fn draw_chart<'a, DB, Y>(
    chart: &mut ChartContext<'a, DB, Cartesian2d<RangedCoordf64, Y>>,
    selected: &[Selected<'_>],
    layers: &[Vec<f64>],
    floor: f64,
    style: &ChartStyle,
) -> Result<()>
where
    DB: DrawingBackend + 'a,
    DB::ErrorType: 'static,
    Y: Ranged<ValueType = f64> + ValueFormatter<f64>,
{
    chart
        .configure_mesh()
        .x_desc("sample")
        .y_desc("value")
        .y_label_formatter(&format_value)
        .draw()?;

    for (idx, (series, layer)) in selected.iter().zip(layers).enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        match style.kind {
            ChartKind::Lines => {
                chart
                    .draw_series(LineSeries::new(
                        layer.iter().enumerate().map(|(x, y)| (x as f64, *y)),
                        color.stroke_width(2),
                    ))?
                    .label(series.key)
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }
            ChartKind::Stacked => {
                // Outline runs along this layer's top, then back along the one below
                let mut outline: Vec<(f64, f64)> = layer
                    .iter()
                    .enumerate()
                    .map(|(x, y)| (x as f64, *y))
                    .collect();
                match idx.checked_sub(1).and_then(|below| layers.get(below)) {
                    Some(below) => outline.extend(
                        below
                            .iter()
                            .enumerate()
                            .rev()
                            .map(|(x, y)| (x as f64, *y)),
                    ),
                    None => outline.extend((0..layer.len()).rev().map(|x| (x as f64, floor))),
                }
                chart
                    .draw_series(std::iter::once(Polygon::new(
                        outline,
                        color.mix(0.8).filled(),
                    )))?
                    .label(series.key)
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.filled())
                    });
            }
        }
    }

    chart
        .configure_series_labels()
        .position(style.legend.position())
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

/// Write the selected series as pretty-printed JSON
pub fn write_json<W: Write>(selected: &[Selected<'_>], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, selected)
        .context("Failed to encode series as JSON")?;
    writeln!(writer)?;
    Ok(())
}

/// Open the chart in an external viewer and wait for it to close
pub fn launch_viewer<P: AsRef<Path>>(viewer: &str, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut parts = viewer.split_whitespace();
    let program = parts.next().context("Viewer command is empty")?;

    info!(viewer = %viewer, path = %path.display(), "waiting for viewer to exit");
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to start viewer: {}", program))?;

    if !status.success() {
        warn!(viewer = %viewer, %status, "viewer exited unsuccessfully");
    }
    Ok(())
}
