//! Fuzz target: decoding of Messages API stream events.
//!
//! The first line of the input is the event name, the rest is the data
//! payload. Decoding must never panic, whatever the server sends.

#![no_main]

use fabric_provider::sse::decode_event;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (event, payload) = text.split_once('\n').unwrap_or((text, ""));
    let _ = decode_event(event, payload);
});
