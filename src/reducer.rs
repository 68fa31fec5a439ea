//! Bounded series for interactive display
//!
//! Two reductions turn an unbounded number of samples into something a
//! renderer can draw every frame:
//!
//! - [`WindowedSampler`] picks which samples of one location to draw inside a
//!   visible time window. The stride for a frame is derived from the number
//!   of eligible samples counted during the previous frame, so the drawn
//!   count converges on the budget without a separate counting pass. Output
//!   is hard-capped at twice the budget.
//! - [`RateSeries`] is a cumulative event count over time. Any sub-window is
//!   found by binary search and the local activity rate is `Δcount / Δtime`,
//!   with no histogram bucket width to choose.

use crate::aggregate::{MeasurementElement, Sample};
use crate::loader::SessionRow;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;

/// Default number of samples drawn per location and frame
pub const DEFAULT_SAMPLE_BUDGET: usize = 5000;

/// Visible time range `[lo, hi]`, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeWindow {
    pub lo: f64,
    pub hi: f64,
}

impl TimeWindow {
    /// Create a window; reversed bounds are swapped
    pub fn new(lo: f64, hi: f64) -> Self {
        if hi < lo {
            Self { lo: hi, hi: lo }
        } else {
            Self { lo, hi }
        }
    }

    /// True if the sample's interval intersects the window
    pub fn overlaps(&self, sample: &Sample) -> bool {
        sample.end() >= self.lo && sample.time <= self.hi
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

/// How eligible samples are thinned for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    /// Draw every eligible sample
    All,
    /// Skip every n-th eligible sample
    DropEvery(usize),
    /// Visit only every n-th sample
    KeepEvery(usize),
}

impl Stride {
    /// Stride for a frame, given the eligible count of the previous frame
    ///
    /// With `ratio = budget / (previous - budget)`, a ratio above one drops
    /// every `1 + floor(ratio)`-th sample; otherwise only every
    /// `ceil(previous / budget)`-th sample is visited.
    pub fn from_previous(previous: usize, budget: usize) -> Self {
        if budget == 0 || previous <= budget {
            return Stride::All;
        }
        let ratio = budget as f64 / (previous - budget) as f64;
        if ratio > 1.0 {
            Stride::DropEvery(1 + ratio.floor() as usize)
        } else {
            Stride::KeepEvery(previous.div_ceil(budget))
        }
    }

    fn step(&self) -> usize {
        match *self {
            Stride::KeepEvery(n) => n.max(1),
            Stride::All | Stride::DropEvery(_) => 1,
        }
    }
}

/// Samples chosen for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Indices into the location's sample slice, ascending
    pub indices: Vec<usize>,
    /// Estimated number of eligible samples in the window
    pub counted: usize,
    pub stride: Stride,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Resolve the indices against the sample slice they were taken from
    pub fn samples<'a>(&'a self, samples: &'a [Sample]) -> impl Iterator<Item = &'a Sample> + 'a {
        self.indices.iter().map(move |&i| &samples[i])
    }
}

/// Select the samples of one location to draw in `window`
///
/// `previous_count` is the `counted` value of the previous frame for the same
/// location (0 on the first frame). When `sorted_max_duration` is given the
/// samples must be ordered by start time and the scan starts from a binary
/// search; otherwise every sample is visited.
pub fn select_samples(
    samples: &[Sample],
    window: TimeWindow,
    budget: usize,
    min_duration: f64,
    previous_count: usize,
    sorted_max_duration: Option<f64>,
) -> Selection {
    let stride = Stride::from_previous(previous_count, budget);
    let step = stride.step();
    let cap = budget.saturating_mul(2);

    let start = match sorted_max_duration {
        Some(max_duration) => {
            let earliest = window.lo - max_duration;
            samples.partition_point(|s| s.time < earliest)
        }
        None => 0,
    };

    let mut indices = Vec::new();
    let mut counted = 0usize;
    let mut eligible = 0usize;
    let mut i = start;
    while i < samples.len() {
        let sample = &samples[i];
        if sorted_max_duration.is_some() && sample.time > window.hi {
            break;
        }
        if window.overlaps(sample) && sample.duration >= min_duration {
            counted += step;
            let keep = match stride {
                Stride::DropEvery(n) => eligible % n != n - 1,
                Stride::All | Stride::KeepEvery(_) => true,
            };
            eligible += 1;
            if keep && indices.len() < cap {
                indices.push(i);
            }
        }
        i += step;
    }

    Selection {
        indices,
        counted,
        stride,
    }
}

/// Frame-to-frame sample selection for every location of a session
#[derive(Debug, Clone)]
pub struct WindowedSampler {
    budget: usize,
    min_duration: f64,
    last_frame: HashMap<String, usize>,
}

impl Default for WindowedSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_BUDGET)
    }
}

impl WindowedSampler {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            min_duration: 0.0,
            last_frame: HashMap::new(),
        }
    }

    /// Exclude samples shorter than `min_duration` seconds
    pub fn with_min_duration(mut self, min_duration: f64) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    pub fn set_min_duration(&mut self, min_duration: f64) {
        self.min_duration = min_duration;
    }

    /// Select this frame's samples of `element` and remember the count
    pub fn select(&mut self, element: &MeasurementElement, window: TimeWindow) -> Selection {
        let previous = self.last_frame.get(&element.key).copied().unwrap_or(0);
        let sorted_max = element.time_sorted.then_some(element.max_duration);
        let selection = select_samples(
            &element.samples,
            window,
            self.budget,
            self.min_duration,
            previous,
            sorted_max,
        );
        self.last_frame.insert(element.key.clone(), selection.counted);
        selection
    }

    /// Eligible count recorded for `key` in the last frame
    pub fn previous_count(&self, key: &str) -> Option<usize> {
        self.last_frame.get(key).copied()
    }

    /// Forget all per-location history
    pub fn reset(&mut self) {
        self.last_frame.clear();
    }
}

/// One entry of the cumulative event count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatePoint {
    pub time: f64,
    pub cumulative_count: u64,
}

/// Local activity rate at a point in time, in events per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSample {
    pub time: f64,
    pub rate: f64,
}

/// Cumulative count of all events, ordered by start time
#[derive(Debug, Clone, Default)]
pub struct RateSeries {
    points: Vec<RatePoint>,
}

impl RateSeries {
    pub fn from_rows(rows: &[SessionRow]) -> Self {
        Self::from_times(rows.iter().map(|row| row.time))
    }

    pub fn from_times(times: impl IntoIterator<Item = f64>) -> Self {
        let mut times: Vec<f64> = times.into_iter().collect();
        times.sort_by(f64::total_cmp);
        let points = times
            .into_iter()
            .enumerate()
            .map(|(i, time)| RatePoint {
                time,
                cumulative_count: i as u64 + 1,
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[RatePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index range of the points with `lo <= time <= hi`
    pub fn range(&self, window: TimeWindow) -> Range<usize> {
        let start = self.points.partition_point(|p| p.time < window.lo);
        let end = self.points.partition_point(|p| p.time <= window.hi);
        start..end.max(start)
    }

    /// Number of events starting inside the window
    pub fn count_between(&self, window: TimeWindow) -> u64 {
        self.range(window).len() as u64
    }

    /// Mean rate over the whole window; `None` for an empty-width window
    pub fn rate_between(&self, window: TimeWindow) -> Option<f64> {
        let width = window.width();
        (width > 0.0).then(|| self.count_between(window) as f64 / width)
    }

    /// At most `budget` local-rate samples across the window
    ///
    /// Each sample spans `stride` consecutive events; spans of zero width are
    /// skipped.
    pub fn rates_in_window(&self, window: TimeWindow, budget: usize) -> Vec<RateSample> {
        let range = self.range(window);
        if range.len() < 2 || budget == 0 {
            return Vec::new();
        }
        let stride = range.len().div_ceil(budget).max(1);
        let last = range.end - 1;

        range
            .clone()
            .step_by(stride)
            .filter_map(|idx| {
                let next = (idx + stride).min(last);
                if next <= idx {
                    return None;
                }
                let a = self.points[idx];
                let b = self.points[next];
                let dt = b.time - a.time;
                (dt > 0.0).then(|| RateSample {
                    time: a.time,
                    rate: (b.cumulative_count - a.cumulative_count) as f64 / dt,
                })
            })
            .collect()
    }
}
