//! Fuzz target for MONITOR line parsing.
//!
//! The capture reader feeds every line the source sends through this
//! parser, so it must reject garbage without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use redis_replicator::capture::parse_monitor_line;

fuzz_target!(|line: &str| {
    if let Ok(cmd) = parse_monitor_line(line) {
        // Verbs come out lowercased
        assert_eq!(cmd.verb, cmd.verb.to_ascii_lowercase());
    }
});
