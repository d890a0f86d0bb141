//! Fuzz target: YAML session log decoding.
//!
//! Session files are user-editable, so any content must either decode or
//! produce an error.

#![no_main]

use fabric_core::session::parse_log;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_log(text);
    }
});
