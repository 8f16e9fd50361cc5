//! fsysinfo-plot - plot counters from QNX `fsysinfo -l` logs.
//!
//! Reads a log, optionally differentiates and averages every series, and
//! draws the requested keys as overlaid lines or a stacked-area chart.

mod config;
mod fsysinfo;
mod plot;
mod transform;

use anyhow::{Context, Result};
use config::{Invocation, PlotConfig};
use fsysinfo::SampleSet;
use std::io::{self, Write};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let config = match config::parse_args(std::env::args()) {
        Ok(Invocation::Help(text)) => {
            println!("{}", text);
            return Ok(());
        }
        Ok(Invocation::Run(config)) => config,
        Err(e) => e.exit(),
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    for flag in &config.ignored_flags {
        debug!(flag = %flag, "ignoring unknown flag");
    }

    run(&config)
}

fn run(config: &PlotConfig) -> Result<()> {
    let path = config
        .file
        .as_deref()
        .context("no FILE given (use --help for usage)")?;

    let samples = fsysinfo::parse_file(path)?;
    if samples.is_empty() {
        warn!(path = %path.display(), "no complete report in log");
    }
    debug!(keys = ?samples.keys().collect::<Vec<_>>(), "parsed log");

    let samples = transform::apply(samples, config.diff, config.average_window);

    if config.list {
        return write_key_list(&samples, io::stdout().lock());
    }

    let selected = plot::select_series(&samples, &config.keys)?;

    if config.json {
        return plot::write_json(&selected, io::stdout().lock());
    }

    plot::render_svg(&selected, &config.chart, &config.output)
        .with_context(|| format!("Failed to render chart: {}", config.output.display()))?;
    info!(
        path = %config.output.display(),
        series = selected.len(),
        samples = selected.first().map(|s| s.values.len()).unwrap_or(0),
        "chart written",
    );

    if let Some(viewer) = &config.viewer {
        plot::launch_viewer(viewer, &config.output)?;
    }

    Ok(())
}

/// Print each key with the number of samples it holds
fn write_key_list<W: Write>(samples: &SampleSet<f64>, mut out: W) -> Result<()> {
    for (key, values) in samples.iter() {
        writeln!(out, "{}\t{}", key, values.len())?;
    }
    Ok(())
}
