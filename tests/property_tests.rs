//! Property-based tests for location ids, rankings and budgeted reduction

use proptest::prelude::*;
use scopeprof::aggregate::aggregate;
use scopeprof::aggregate::Sample;
use scopeprof::loader::SessionRow;
use scopeprof::location::{location_id, Location};
use scopeprof::reducer::{select_samples, RateSeries, TimeWindow};

fn rows_from(events: &[(u8, f64, f64)]) -> Vec<SessionRow> {
    events
        .iter()
        .map(|&(site, time, duration)| SessionRow {
            time,
            duration,
            path: format!("src/m{}.rs", site % 3),
            line: u32::from(site),
            function: format!("f{site}"),
            label: String::new(),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_location_id_is_deterministic(
        path in "[a-z/_.]{1,30}",
        line in 0u32..100_000,
        function in "[a-z_:]{1,30}",
        label in "[a-z ]{0,10}",
    ) {
        let first = location_id(&path, line, &function);
        prop_assert_eq!(first, location_id(&path, line, &function));
        prop_assert_eq!(Location::new(&path, line, &function, &label).id, first);
        prop_assert_eq!(Location::new(&path, line, &function, "").id, first);
    }

    #[test]
    fn prop_table_line_parses_back(
        path in "[a-z/_.]{1,30}",
        line in 0u32..100_000,
        function in "[a-z_:]{1,30}",
        label in "[a-z ;]{0,10}",
    ) {
        let location = Location::new(&path, line, &function, &label);
        let parsed = Location::from_table_line(&location.to_table_line()).unwrap();
        prop_assert_eq!(parsed, location);
    }

    #[test]
    fn prop_table_line_keeps_id_with_separators(
        path in "[a-z;/.]{1,20}",
        line in 0u32..100_000,
        function in "[a-z;:]{1,20}",
        label in "[a-z ;]{0,10}",
    ) {
        let location = Location::new(&path, line, &function, &label);
        let parsed = Location::from_table_line(&location.to_table_line()).unwrap();
        prop_assert_eq!(parsed.id, location_id(&path, line, &function));
        prop_assert_eq!(parsed.line, line);
        prop_assert_eq!(parsed.path, path.replace(';', ","));
        prop_assert_eq!(parsed.function, function.replace(';', ","));
        prop_assert_eq!(parsed.label, label);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_duration_rank_is_permutation(
        events in prop::collection::vec((0u8..12, 0.0f64..100.0, 0.0f64..1.0), 1..200),
    ) {
        let stats = aggregate(&rows_from(&events));
        let mut ranks: Vec<_> = stats.elements().iter().map(|e| e.duration_rank).collect();
        ranks.sort_unstable();
        prop_assert_eq!(ranks, (0..stats.len()).collect::<Vec<_>>());

        let mut ranks: Vec<_> = stats.elements().iter().map(|e| e.appearance_rank).collect();
        ranks.sort_unstable();
        prop_assert_eq!(ranks, (0..stats.len()).collect::<Vec<_>>());
    }

    #[test]
    fn prop_ranking_ignores_interleaving(
        events in prop::collection::vec((0u8..6, 0.0f64..100.0, 0.001f64..1.0), 1..100),
    ) {
        // Regroup events by site, keeping each site's own order and the
        // order in which sites first appeared.
        let mut regrouped = Vec::new();
        let mut seen = Vec::new();
        for &(site, _, _) in &events {
            if !seen.contains(&site) {
                seen.push(site);
                regrouped.extend(events.iter().filter(|e| e.0 == site).copied());
            }
        }

        let original = aggregate(&rows_from(&events));
        let reordered = aggregate(&rows_from(&regrouped));
        for element in original.elements() {
            let other = reordered.get(&element.key).unwrap();
            prop_assert_eq!(element.duration_rank, other.duration_rank);
            prop_assert_eq!(element.hits(), other.hits());
            prop_assert!((element.mean_duration - other.mean_duration).abs() < 1e-12);
        }
    }

    #[test]
    fn prop_selection_within_budget_and_window(
        mut starts in prop::collection::vec(0.0f64..1000.0, 0..3000),
        durations in prop::collection::vec(0.0f64..5.0, 3000),
        lo in 0.0f64..1000.0,
        width in 0.0f64..500.0,
        budget in 1usize..400,
        previous in 0usize..5000,
        sorted in any::<bool>(),
    ) {
        if sorted {
            starts.sort_by(f64::total_cmp);
        }
        let samples: Vec<_> = starts
            .iter()
            .zip(&durations)
            .map(|(&time, &duration)| Sample { time, duration })
            .collect();
        let max_duration = samples.iter().map(|s| s.duration).fold(0.0, f64::max);
        let window = TimeWindow::new(lo, lo + width);

        let selection = select_samples(
            &samples,
            window,
            budget,
            0.0,
            previous,
            sorted.then_some(max_duration),
        );
        prop_assert!(selection.len() <= 2 * budget);
        for sample in selection.samples(&samples) {
            prop_assert!(window.overlaps(sample));
        }
        prop_assert!(selection.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_sorted_scan_matches_linear_scan(
        mut starts in prop::collection::vec(0.0f64..100.0, 0..500),
        lo in 0.0f64..100.0,
        width in 0.0f64..50.0,
    ) {
        starts.sort_by(f64::total_cmp);
        let samples: Vec<_> = starts
            .iter()
            .enumerate()
            .map(|(i, &time)| Sample { time, duration: (i % 7) as f64 * 0.5 })
            .collect();
        let max_duration = samples.iter().map(|s| s.duration).fold(0.0, f64::max);
        let window = TimeWindow::new(lo, lo + width);

        let fast = select_samples(&samples, window, 10_000, 0.0, 0, Some(max_duration));
        let slow = select_samples(&samples, window, 10_000, 0.0, 0, None);
        prop_assert_eq!(fast, slow);
    }

    #[test]
    fn prop_rate_series_bounded(
        times in prop::collection::vec(0.0f64..1000.0, 0..2000),
        budget in 1usize..300,
    ) {
        let series = RateSeries::from_times(times.iter().copied());
        prop_assert!(series
            .points()
            .windows(2)
            .all(|w| w[0].time <= w[1].time && w[0].cumulative_count < w[1].cumulative_count));
        let rates = series.rates_in_window(TimeWindow::new(0.0, 1000.0), budget);
        prop_assert!(rates.len() <= budget);
        prop_assert!(rates.iter().all(|r| r.rate.is_finite() && r.rate > 0.0));
    }
}
