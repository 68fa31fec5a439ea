//! Per-location summary reports
//!
//! Renders [`SessionStats`] as a fixed-width text table or as JSON, plus a
//! short report for one reduced time window. With JSON output both reports
//! go into a single [`WindowedReport`] document.

use crate::aggregate::{LocationOrder, MeasurementElement, SessionStats};
use crate::analysis::WindowSummary;
use serde::Serialize;

/// One location in a summary report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub rank: usize,
    pub name: String,
    pub key: String,
    pub label: String,
    pub hits: usize,
    pub mean_duration: f64,
    pub std_deviation: f64,
    pub cumulative_time: f64,
    /// Share of the session length, in percent
    pub percentage: f64,
    pub mean_frequency: Option<f64>,
    pub first_start: f64,
}

impl SummaryEntry {
    fn new(rank: usize, element: &MeasurementElement, end_time: f64) -> Self {
        let percentage = if end_time > 0.0 {
            element.cumulative_time() / end_time * 100.0
        } else {
            0.0
        };
        Self {
            rank,
            name: element.display_name(),
            key: element.key.clone(),
            label: element.label.clone(),
            hits: element.hits(),
            mean_duration: element.mean_duration,
            std_deviation: element.std_deviation,
            cumulative_time: element.cumulative_time(),
            percentage,
            mean_frequency: element.mean_frequency,
            first_start: element.first_start,
        }
    }
}

/// Whole-session summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub events: usize,
    pub locations: usize,
    pub end_time: f64,
    pub total_time: f64,
    pub entries: Vec<SummaryEntry>,
}

impl SummaryReport {
    pub fn new(stats: &SessionStats, order: LocationOrder) -> Self {
        let entries = stats
            .iter(order)
            .enumerate()
            .map(|(rank, element)| SummaryEntry::new(rank, element, stats.end_time()))
            .collect();
        Self {
            events: stats.total_hits(),
            locations: stats.len(),
            end_time: stats.end_time(),
            total_time: stats.total_time(),
            entries,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Fixed-width table, one line per location
    pub fn to_text(&self) -> String {
        if self.entries.is_empty() {
            return "No measurements recorded.\n".to_string();
        }

        let mut out = String::new();
        out.push_str("% time   cumulative(s)     mean(s)   std dev(s)      hits    freq(Hz) location\n");
        out.push_str("------ --------------- ----------- ------------ --------- ----------- ----------------\n");
        for entry in &self.entries {
            let frequency = entry
                .mean_frequency
                .map(|f| format!("{f:.3}"))
                .unwrap_or_else(|| "-".to_string());
            let name = if entry.label.is_empty() {
                entry.name.clone()
            } else {
                format!("{} [{}]", entry.name, entry.label)
            };
            out.push_str(&format!(
                "{:6.2} {:>15.6} {:>11.6} {:>12.6} {:>9} {:>11} {}\n",
                entry.percentage,
                entry.cumulative_time,
                entry.mean_duration,
                entry.std_deviation,
                entry.hits,
                frequency,
                name
            ));
        }
        out.push_str("------ --------------- ----------- ------------ --------- ----------- ----------------\n");
        out.push_str(&format!(
            "{:>22.6} {:>36} events in {:.6}s, {} locations\n",
            self.total_time, self.events, self.end_time, self.locations
        ));
        out
    }
}

/// Summary and window report as one JSON document
#[derive(Debug, Serialize)]
pub struct WindowedReport<'a> {
    pub summary: &'a SummaryReport,
    pub window: &'a WindowSummary,
}

impl WindowedReport<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Text report for one reduced window
pub fn window_text(summary: &WindowSummary) -> String {
    let mut out = format!(
        "Window {:.6}s..{:.6}s: {} events",
        summary.window.lo, summary.window.hi, summary.events
    );
    match summary.rate {
        Some(rate) => out.push_str(&format!(", {rate:.3} events/s\n")),
        None => out.push('\n'),
    }
    for location in &summary.locations {
        out.push_str(&format!(
            "  {:>9} drawn {:>9} counted  {}\n",
            location.drawn, location.counted, location.key
        ));
    }
    if let (Some(min), Some(max)) = (
        summary.rates.iter().map(|r| r.rate).reduce(f64::min),
        summary.rates.iter().map(|r| r.rate).reduce(f64::max),
    ) {
        out.push_str(&format!(
            "  activity rate {min:.3}..{max:.3} events/s over {} points\n",
            summary.rates.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::analysis::WindowedLocation;
    use crate::loader::SessionRow;
    use crate::reducer::TimeWindow;

    fn row(time: f64, duration: f64, line: u32, function: &str) -> SessionRow {
        SessionRow {
            time,
            duration,
            path: "src/app.rs".to_string(),
            line,
            function: function.to_string(),
            label: String::new(),
        }
    }

    fn stats() -> SessionStats {
        let mut rows: Vec<_> = (0..10).map(|i| row(i as f64, 0.001, 1, "a")).collect();
        rows.push(row(4.0, 0.5, 2, "b"));
        aggregate(&rows)
    }

    #[test]
    fn test_report_orders_entries() {
        let report = SummaryReport::new(&stats(), LocationOrder::Duration);
        assert_eq!(report.events, 11);
        assert_eq!(report.locations, 2);
        assert_eq!(report.entries[0].name, "app.rs (2): b");
        assert_eq!(report.entries[0].rank, 0);
        assert_eq!(report.entries[1].hits, 10);

        let report = SummaryReport::new(&stats(), LocationOrder::Appearance);
        assert_eq!(report.entries[0].name, "app.rs (1): a");
    }

    #[test]
    fn test_text_lists_every_location() {
        let text = SummaryReport::new(&stats(), LocationOrder::Duration).to_text();
        assert!(text.contains("app.rs (1): a"));
        assert!(text.contains("app.rs (2): b"));
        assert!(text.contains("11 events"));
    }

    #[test]
    fn test_text_empty() {
        let text = SummaryReport::new(&SessionStats::default(), LocationOrder::Duration).to_text();
        assert_eq!(text, "No measurements recorded.\n");
    }

    #[test]
    fn test_json_unavailable_frequency_is_null() {
        let json = SummaryReport::new(&stats(), LocationOrder::Duration)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["entries"][0]["mean_frequency"].is_null());
        assert!(value["entries"][1]["mean_frequency"].is_number());
    }

    #[test]
    fn test_windowed_report_is_one_document() {
        let report = SummaryReport::new(&stats(), LocationOrder::Duration);
        let window = WindowSummary {
            window: TimeWindow::new(0.0, 2.0),
            locations: vec![WindowedLocation {
                key: "src/app.rs(1): a".to_string(),
                drawn: 3,
                counted: 3,
            }],
            events: 3,
            rate: Some(1.5),
            rates: Vec::new(),
        };
        let json = WindowedReport {
            summary: &report,
            window: &window,
        }
        .to_json()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["events"], 11);
        assert_eq!(value["window"]["events"], 3);
        assert_eq!(value["window"]["locations"][0]["drawn"], 3);
    }

    #[test]
    fn test_window_text() {
        let window = WindowSummary {
            window: TimeWindow::new(1.0, 2.0),
            locations: Vec::new(),
            events: 0,
            rate: None,
            rates: Vec::new(),
        };
        assert_eq!(window_text(&window), "Window 1.000000s..2.000000s: 0 events\n");
    }
}
