//! CLI argument parsing for scopeprof

use crate::aggregate::LocationOrder;
use crate::config::AnalysisConfig;
use crate::reducer::TimeWindow;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the summary report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// Semicolon-separated statistics table
    Csv,
}

/// Order of the locations in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Cumulative time, descending
    Duration,
    /// First appearance, ascending
    Appearance,
}

impl From<SortKey> for LocationOrder {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Duration => LocationOrder::Duration,
            SortKey::Appearance => LocationOrder::Appearance,
        }
    }
}

/// Parse `LO:HI` in seconds
pub fn parse_window(value: &str) -> Result<TimeWindow, String> {
    let (lo, hi) = value
        .split_once(':')
        .ok_or_else(|| format!("expected LO:HI, got `{value}`"))?;
    let lo: f64 = lo
        .trim()
        .parse()
        .map_err(|_| format!("invalid window start `{lo}`"))?;
    let hi: f64 = hi
        .trim()
        .parse()
        .map_err(|_| format!("invalid window end `{hi}`"))?;
    if !lo.is_finite() || !hi.is_finite() {
        return Err("window bounds must be finite".to_string());
    }
    Ok(TimeWindow::new(lo, hi))
}

#[derive(Parser, Debug)]
#[command(name = "scopeprof")]
#[command(version)]
#[command(about = "Summarize and reduce recorded scope profiling sessions", long_about = None)]
pub struct Cli {
    /// Directory holding profiler_session.bin and measures_id_map.csv
    #[arg(value_name = "SESSION_DIR")]
    pub session_dir: PathBuf,

    /// Output format for the summary
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Sort order of the summary
    #[arg(long = "sort", value_enum)]
    pub sort: Option<SortKey>,

    /// Keep only locations whose key or label matches REGEX
    #[arg(long = "filter", value_name = "REGEX")]
    pub filter: Option<String>,

    /// Write every event to FILE as semicolon-separated values
    #[arg(long = "export-session", value_name = "FILE")]
    pub export_session: Option<PathBuf>,

    /// Write per-location statistics to FILE as semicolon-separated values
    #[arg(long = "export-stats", value_name = "FILE")]
    pub export_stats: Option<PathBuf>,

    /// Report budgeted sample selection and activity rate for LO:HI seconds
    #[arg(long = "window", value_name = "LO:HI", value_parser = parse_window)]
    pub window: Option<TimeWindow>,

    /// Samples drawn per location in a window
    #[arg(long = "budget", value_name = "N")]
    pub budget: Option<usize>,

    /// Ignore samples shorter than SECS in window reports
    #[arg(long = "min-duration", value_name = "SECS")]
    pub min_duration: Option<f64>,

    /// Load analysis settings from a TOML file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Load on a background thread and show progress on stderr
    #[arg(long = "progress")]
    pub progress: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply command-line overrides on top of `config`
    pub fn apply_overrides(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(sort) = self.sort {
            config.order = sort.into();
        }
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(budget) = self.budget {
            config.sample_budget = budget;
        }
        if let Some(min_duration) = self.min_duration {
            config.min_duration = min_duration;
        }
        config
    }
}
