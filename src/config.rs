//! Command line parsing into an immutable [`PlotConfig`].

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use crate::fsysinfo::CATEGORIES;
use crate::plot::{ChartKind, ChartStyle, LegendCorner, YScale};

/// Switches that take no value.
const SWITCHES: &[&str] = &[
    "--stackplot",
    "--diff",
    "--log",
    "--legendright",
    "--json",
    "--list",
    "--version",
];

/// Options that consume the following token unless given as `--opt=value`.
const VALUED: &[&str] = &["--avg", "--output", "--viewer", "--log-level"];

/// Plots a QNX fsysinfo log
#[derive(Parser, Debug)]
#[command(name = "fsysinfo-plot")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "fsysinfo-plot [OPTION]... FILE -- KEY...")]
#[command(disable_help_flag = true)]
#[command(args_override_self = true)]
#[command(after_long_help = key_help())]
struct Args {
    /// Draw a stacked-area chart instead of overlaid lines
    #[arg(long)]
    stackplot: bool,

    /// Plot the difference between consecutive samples
    #[arg(long)]
    diff: bool,

    /// Average every N samples (applied after --diff)
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    avg: u64,

    /// Logarithmic y-axis (be careful with negative values or --diff)
    #[arg(long)]
    log: bool,

    /// Draw the legend in the top right instead of the top left corner
    #[arg(long)]
    legendright: bool,

    /// Where the SVG chart is written
    #[arg(long, value_name = "PATH", default_value = "fsysinfo_plot.svg")]
    output: PathBuf,

    /// Open the chart with CMD and wait for it to exit
    #[arg(long, value_name = "CMD")]
    viewer: Option<String>,

    /// Print the selected series as JSON instead of drawing a chart
    #[arg(long)]
    json: bool,

    /// Print every key found in FILE with its sample count
    #[arg(long)]
    list: bool,

    /// Logging verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// fsysinfo log to read; the last one given wins
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Keys to plot, e.g. "SYSCALL.rename"
    #[arg(last = true, value_name = "KEY")]
    keys: Vec<String>,
}

fn key_help() -> String {
    let mut help = String::from("Keys are formatted like \"SYSCALL.rename\":\n");
    for (category, metrics) in CATEGORIES {
        help.push_str(&format!("  {:<10}{}\n", category, metrics.join(", ")));
    }
    help.push_str("\nExample:\n");
    help.push_str(
        "  fsysinfo-plot --diff my_fsysinfo_log -- SYSCALL.open \"DISK I/O.read\" \"DISK I/O.write\"\n",
    );
    help.push_str("\nRecord a log with `fsysinfo -l PERIOD`, PERIOD in milliseconds.");
    help
}

/// Settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PlotConfig {
    pub file: Option<PathBuf>,
    pub keys: Vec<String>,
    pub diff: bool,
    pub average_window: usize,
    pub chart: ChartStyle,
    pub output: PathBuf,
    pub viewer: Option<String>,
    pub json: bool,
    pub list: bool,
    pub log_level: String,
    /// Unrecognised flags that were dropped before parsing
    pub ignored_flags: Vec<String>,
}

/// What the command line asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// `--help` was given somewhere; holds the rendered usage text
    Help(String),
    Run(PlotConfig),
}

/// Parse a full argument vector, program name first.
///
/// `--help` anywhere, even among the keys, wins over everything else.
/// Unknown flags before `--` are dropped rather than rejected.
pub fn parse_args<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    if args.iter().skip(1).any(|arg| arg == "--help") {
        return Ok(Invocation::Help(help_text()));
    }

    let (args, ignored_flags) = strip_unknown_flags(args);
    let parsed = Args::try_parse_from(args)?;
    Ok(Invocation::Run(PlotConfig::from_args(parsed, ignored_flags)))
}

pub fn help_text() -> String {
    Args::command().render_long_help().to_string()
}

/// Split off flags clap would reject, keeping everything after `--` intact.
fn strip_unknown_flags(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::with_capacity(args.len());
    let mut ignored = Vec::new();
    let mut args = args.into_iter();

    if let Some(program) = args.next() {
        kept.push(program);
    }

    while let Some(arg) = args.next() {
        if arg == "--" {
            kept.push(arg);
            kept.extend(args.by_ref());
            break;
        }

        let name = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
        let takes_value = VALUED.contains(&name) && !arg.contains('=');
        let known = SWITCHES.contains(&name) || VALUED.contains(&name);

        if known || arg == "-" || !arg.starts_with('-') {
            kept.push(arg);
            if takes_value {
                kept.extend(args.next());
            }
        } else {
            ignored.push(arg);
        }
    }

    (kept, ignored)
}

impl PlotConfig {
    fn from_args(mut args: Args, ignored_flags: Vec<String>) -> Self {
        let chart = ChartStyle {
            kind: if args.stackplot {
                ChartKind::Stacked
            } else {
                ChartKind::Lines
            },
            legend: if args.legendright {
                LegendCorner::TopRight
            } else {
                LegendCorner::TopLeft
            },
            scale: if args.log { YScale::Log } else { YScale::Linear },
        };

        Self {
            file: args.files.pop(),
            keys: args.keys,
            diff: args.diff,
            average_window: usize::try_from(args.avg).unwrap_or(usize::MAX),
            chart,
            output: args.output,
            viewer: args.viewer,
            json: args.json,
            list: args.list,
            log_level: args.log_level,
            ignored_flags,
        }
    }
}
