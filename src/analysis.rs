//! Loaded sessions ready for display
//!
//! An [`AnalysisSession`] bundles the rows of one session with their
//! per-location statistics and the activity-rate series. It can be built
//! synchronously with [`AnalysisSession::open`] or on a worker thread with
//! [`AnalysisSession::spawn`], in which case the caller polls the shared
//! [`LoadProgress`] until the worker is done.

use crate::aggregate::{aggregate, SessionStats};
use crate::config::AnalysisConfig;
use crate::loader::{self, LoadProgress, SessionError, SessionRow};
use crate::reducer::{RateSample, RateSeries, TimeWindow, WindowedSampler};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Invalid location filter: {0}")]
    Filter(#[from] regex::Error),

    #[error("Failed to start analysis worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Analysis worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Reduced view of one location inside a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowedLocation {
    pub key: String,
    /// Samples selected for drawing
    pub drawn: usize,
    /// Eligible samples counted during selection
    pub counted: usize,
}

/// Everything a viewer draws for one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub window: TimeWindow,
    pub locations: Vec<WindowedLocation>,
    /// Events starting inside the window
    pub events: u64,
    /// Mean events per second over the window
    pub rate: Option<f64>,
    pub rates: Vec<RateSample>,
}

/// A fully loaded and aggregated session
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    source: PathBuf,
    config: AnalysisConfig,
    rows: Vec<SessionRow>,
    stats: SessionStats,
    rates: RateSeries,
}

impl AnalysisSession {
    /// Load and aggregate the session stored in `dir`
    pub fn open(dir: impl AsRef<Path>, config: &AnalysisConfig) -> Result<Self> {
        Self::load(dir.as_ref(), config, None)
    }

    /// Load on a worker thread
    ///
    /// The returned handle exposes the load fraction while the worker runs.
    pub fn spawn(dir: impl AsRef<Path>, config: &AnalysisConfig) -> Result<PendingAnalysis> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.clone();
        let progress = Arc::new(LoadProgress::new());
        let worker_progress = Arc::clone(&progress);

        let handle = thread::Builder::new()
            .name("scopeprof-load".to_string())
            .spawn(move || Self::load(&dir, &config, Some(&worker_progress)))
            .map_err(AnalysisError::Spawn)?;

        Ok(PendingAnalysis { progress, handle })
    }

    fn load(dir: &Path, config: &AnalysisConfig, progress: Option<&LoadProgress>) -> Result<Self> {
        let filter = config.filter.as_deref().map(Regex::new).transpose()?;
        let rows = loader::load_with_progress(dir, progress)?;
        let mut stats = aggregate(&rows);
        if let Some(filter) = &filter {
            stats.retain_matching(filter);
        }
        let rates = RateSeries::from_rows(&rows);

        tracing::debug!(
            rows = rows.len(),
            locations = stats.len(),
            "session aggregated"
        );
        Ok(Self {
            source: dir.to_path_buf(),
            config: config.clone(),
            rows,
            stats,
            rates,
        })
    }

    /// Directory the session was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn rows(&self) -> &[SessionRow] {
        &self.rows
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn rates(&self) -> &RateSeries {
        &self.rates
    }

    /// Sampler configured with this session's budget and minimum duration
    pub fn sampler(&self) -> WindowedSampler {
        WindowedSampler::new(self.config.sample_budget).with_min_duration(self.config.min_duration)
    }

    /// Reduce every location to the window, advancing `sampler` by one frame
    pub fn window_summary(&self, sampler: &mut WindowedSampler, window: TimeWindow) -> WindowSummary {
        let locations = self
            .stats
            .iter(self.config.order)
            .map(|element| {
                let selection = sampler.select(element, window);
                WindowedLocation {
                    key: element.key.clone(),
                    drawn: selection.len(),
                    counted: selection.counted,
                }
            })
            .collect();

        WindowSummary {
            window,
            locations,
            events: self.rates.count_between(window),
            rate: self.rates.rate_between(window),
            rates: self.rates.rates_in_window(window, self.config.rate_budget),
        }
    }

    /// Window spanning the whole session
    pub fn full_window(&self) -> TimeWindow {
        TimeWindow::new(0.0, self.stats.end_time())
    }
}

/// An [`AnalysisSession`] being loaded on a worker thread
#[derive(Debug)]
pub struct PendingAnalysis {
    progress: Arc<LoadProgress>,
    handle: JoinHandle<Result<AnalysisSession>>,
}

impl PendingAnalysis {
    /// Fraction of the log processed so far
    pub fn progress(&self) -> f64 {
        self.progress.get()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take its result
    pub fn join(self) -> Result<AnalysisSession> {
        self.handle
            .join()
            .map_err(|_| AnalysisError::WorkerPanicked)?
    }
}
