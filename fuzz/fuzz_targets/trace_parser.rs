#![no_main]

use deltatrace::summary::{Summary, TraceParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw bytes, as a captured trace buffer may hold them
    let _ = Summary::from_reader(data, None);
    let _ = Summary::from_reader(data, Some("+"));

    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(parser) = TraceParser::new() {
            for line in input.lines() {
                let _ = parser.parse_line(line);
            }
        }
    }
});
