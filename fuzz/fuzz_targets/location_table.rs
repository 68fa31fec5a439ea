#![no_main]

use libfuzzer_sys::fuzz_target;
use scopeprof::loader::parse_location_table;

fuzz_target!(|data: &[u8]| {
    // Malformed and non UTF-8 lines are skipped, never fatal
    for (id, location) in parse_location_table(data) {
        assert_eq!(id, location.id);
    }
});
