#![no_main]

use libfuzzer_sys::fuzz_target;
use scopeprof::csv_output::{parse_session_csv, session_to_csv};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(rows) = parse_session_csv(input) {
            // Whatever parses must survive its own export
            let csv = session_to_csv(&rows).expect("export to memory");
            let again = parse_session_csv(&csv).expect("re-export parses");
            assert_eq!(again.len(), rows.len());
        }
    }
});
