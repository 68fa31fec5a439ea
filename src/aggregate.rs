//! Per-location aggregation of a loaded session
//!
//! Rows are grouped by their canonical location key (`path(line): function`),
//! not by numeric id, so sessions recorded by different builds group the same
//! way. Each group becomes a [`MeasurementElement`] holding its samples in
//! arrival order together with derived statistics and its rank in the two
//! total orders:
//!
//! - by cumulative time (`mean_duration * hits`), descending
//! - by first appearance (`first_start`), ascending
//!
//! Both sorts are stable, so ties keep the order in which locations first
//! appeared in the row stream.

use crate::loader::SessionRow;
use crate::location::file_name;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `(start, duration)` pair, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time: f64,
    pub duration: f64,
}

impl Sample {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// Aggregated measurements of one location
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementElement {
    /// Canonical key `path(line): function`
    pub key: String,
    pub path: String,
    /// Final component of `path`
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Label of the first row seen for this location
    pub label: String,
    /// Samples in arrival order
    pub samples: Vec<Sample>,
    pub mean_duration: f64,
    /// `sqrt(Σ(d - mean)²)`, deliberately not divided by the sample count
    pub std_deviation: f64,
    /// Hits per second between `first_start` and `last_end`; `None` with
    /// fewer than two samples or an empty span
    pub mean_frequency: Option<f64>,
    pub first_start: f64,
    pub last_end: f64,
    pub max_duration: f64,
    /// Position in the cumulative-time order (0 = most time)
    pub duration_rank: usize,
    /// Position in the first-appearance order (0 = earliest)
    pub appearance_rank: usize,
    /// Whether `samples` is already ordered by start time
    pub time_sorted: bool,
}

impl MeasurementElement {
    fn new(row: &SessionRow, key: String) -> Self {
        Self {
            key,
            path: row.path.clone(),
            file: file_name(&row.path).to_string(),
            line: row.line,
            function: row.function.clone(),
            label: row.label.clone(),
            samples: Vec::new(),
            mean_duration: 0.0,
            std_deviation: 0.0,
            mean_frequency: None,
            first_start: f64::INFINITY,
            last_end: f64::NEG_INFINITY,
            max_duration: 0.0,
            duration_rank: 0,
            appearance_rank: 0,
            time_sorted: true,
        }
    }

    fn push(&mut self, time: f64, duration: f64) {
        if let Some(last) = self.samples.last() {
            if time < last.time {
                self.time_sorted = false;
            }
        }
        self.samples.push(Sample { time, duration });
        self.first_start = self.first_start.min(time);
        self.last_end = self.last_end.max(time + duration);
        self.max_duration = self.max_duration.max(duration);
        self.mean_duration += duration;
    }

    fn finish(&mut self) {
        let count = self.samples.len() as f64;
        self.mean_duration /= count;

        let mean = self.mean_duration;
        let squares: f64 = self
            .samples
            .iter()
            .map(|s| (s.duration - mean).powi(2))
            .sum();
        self.std_deviation = squares.sqrt();

        let span = self.last_end - self.first_start;
        self.mean_frequency = if self.samples.len() > 1 && span > 0.0 {
            Some(count / span)
        } else {
            None
        };
    }

    pub fn hits(&self) -> usize {
        self.samples.len()
    }

    /// Total time spent in this location
    pub fn cumulative_time(&self) -> f64 {
        self.mean_duration * self.samples.len() as f64
    }

    /// `file (line): function`
    pub fn display_name(&self) -> String {
        format!("{} ({}): {}", self.file, self.line, self.function)
    }
}

/// Order in which locations are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationOrder {
    /// Order of first arrival in the row stream
    Insertion,
    /// Cumulative time, descending
    #[default]
    Duration,
    /// First start time, ascending
    Appearance,
}

/// Quantity shown by a bar chart of the locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarMetric {
    /// Mean duration, with the deviation as error bar
    Mean,
    /// Mean duration times hits
    Cumulative,
    /// Cumulative time as a percentage of the session length
    Percentage,
    /// Hits
    Counts,
    /// Mean frequency (NaN when unavailable)
    Frequency,
}

/// One bar of a per-location bar chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub key: String,
    /// Row of the bar in the requested order
    pub position: usize,
    pub value: f64,
    pub error: Option<f64>,
}

/// All locations of a session, aggregated
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    elements: Vec<MeasurementElement>,
    index: HashMap<String, usize>,
    by_duration: Vec<usize>,
    by_appearance: Vec<usize>,
    end_time: f64,
}

/// Group rows by location and compute per-location statistics
pub fn aggregate(rows: &[SessionRow]) -> SessionStats {
    let mut elements: Vec<MeasurementElement> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = row.key();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = elements.len();
                elements.push(MeasurementElement::new(row, key.clone()));
                index.insert(key, slot);
                slot
            }
        };
        elements[slot].push(row.time, row.duration);
    }

    let mut end_time: f64 = 0.0;
    for element in &mut elements {
        element.finish();
        end_time = end_time.max(element.last_end);
    }

    let mut stats = SessionStats {
        elements,
        index,
        by_duration: Vec::new(),
        by_appearance: Vec::new(),
        end_time,
    };
    stats.rank();
    stats
}

impl SessionStats {
    fn rank(&mut self) {
        let elements = &self.elements;

        let mut by_duration: Vec<usize> = (0..elements.len()).collect();
        by_duration.sort_by(|&a, &b| {
            elements[b]
                .cumulative_time()
                .total_cmp(&elements[a].cumulative_time())
        });

        let mut by_appearance: Vec<usize> = (0..elements.len()).collect();
        by_appearance.sort_by(|&a, &b| {
            elements[a]
                .first_start
                .total_cmp(&elements[b].first_start)
        });

        for (rank, &slot) in by_duration.iter().enumerate() {
            self.elements[slot].duration_rank = rank;
        }
        for (rank, &slot) in by_appearance.iter().enumerate() {
            self.elements[slot].appearance_rank = rank;
        }
        self.by_duration = by_duration;
        self.by_appearance = by_appearance;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Latest scope end over all locations
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn get(&self, key: &str) -> Option<&MeasurementElement> {
        self.index.get(key).map(|&slot| &self.elements[slot])
    }

    /// Locations in the requested order
    pub fn iter(&self, order: LocationOrder) -> Box<dyn Iterator<Item = &MeasurementElement> + '_> {
        match order {
            LocationOrder::Insertion => Box::new(self.elements.iter()),
            LocationOrder::Duration => {
                Box::new(self.by_duration.iter().map(|&slot| &self.elements[slot]))
            }
            LocationOrder::Appearance => {
                Box::new(self.by_appearance.iter().map(|&slot| &self.elements[slot]))
            }
        }
    }

    pub fn elements(&self) -> &[MeasurementElement] {
        &self.elements
    }

    pub fn total_hits(&self) -> usize {
        self.elements.iter().map(MeasurementElement::hits).sum()
    }

    pub fn total_time(&self) -> f64 {
        self.elements
            .iter()
            .map(MeasurementElement::cumulative_time)
            .sum()
    }

    /// Keep only locations whose key or label matches `pattern`, reranking
    /// the survivors
    pub fn retain_matching(&mut self, pattern: &Regex) {
        self.elements
            .retain(|e| pattern.is_match(&e.key) || pattern.is_match(&e.label));
        self.index = self
            .elements
            .iter()
            .enumerate()
            .map(|(slot, e)| (e.key.clone(), slot))
            .collect();
        self.rank();
    }

    /// One bar per location, positioned by `order`
    pub fn bar_series(&self, metric: BarMetric, order: LocationOrder) -> Vec<Bar> {
        self.elements
            .iter()
            .enumerate()
            .map(|(slot, e)| {
                let position = match order {
                    LocationOrder::Insertion => slot,
                    LocationOrder::Duration => e.duration_rank,
                    LocationOrder::Appearance => e.appearance_rank,
                };
                let (value, error) = match metric {
                    BarMetric::Mean => (e.mean_duration, Some(e.std_deviation)),
                    BarMetric::Cumulative => (e.cumulative_time(), None),
                    BarMetric::Percentage => {
                        let pct = if self.end_time > 0.0 {
                            e.cumulative_time() / self.end_time * 100.0
                        } else {
                            0.0
                        };
                        (pct, None)
                    }
                    BarMetric::Counts => (e.hits() as f64, None),
                    BarMetric::Frequency => (e.mean_frequency.unwrap_or(f64::NAN), None),
                };
                Bar {
                    key: e.key.clone(),
                    position,
                    value,
                    error,
                }
            })
            .collect()
    }
}
