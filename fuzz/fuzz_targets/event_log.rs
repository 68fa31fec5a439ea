#![no_main]

use libfuzzer_sys::fuzz_target;
use scopeprof::aggregate::aggregate;
use scopeprof::event::{record_count, RECORD_SIZE};
use scopeprof::loader::{join_records, parse_location_table};
use scopeprof::reducer::{RateSeries, TimeWindow, WindowedSampler};

fuzz_target!(|data: &[u8]| {
    let table = parse_location_table(b"src/a.rs;1;f;;1\n");
    let rows = join_records(data, &table, None);
    assert_eq!(rows.len() as u64, record_count(data.len() as u64));
    assert!(rows.len() * RECORD_SIZE <= data.len());

    // Arbitrary bit patterns include NaN and infinities
    let stats = aggregate(&rows);
    let mut sampler = WindowedSampler::new(16);
    let window = TimeWindow::new(0.0, 1.0);
    for element in stats.elements() {
        assert!(sampler.select(element, window).len() <= 32);
    }
    let _ = RateSeries::from_rows(&rows).rates_in_window(window, 16);
});
