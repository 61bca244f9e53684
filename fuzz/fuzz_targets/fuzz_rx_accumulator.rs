//! Fuzz target: the inbound RX accumulator.
//!
//! Drives arbitrary byte streams into the link's line accumulator and
//! asserts its invariants: the buffer never exceeds 128 bytes, the
//! command queue never exceeds 16 entries, and no input panics it.
//!
//! cargo fuzz run fuzz_rx_accumulator

#![no_main]

use libfuzzer_sys::fuzz_target;
use steamloco::link::TelemetryLink;

fuzz_target!(|data: &[u8]| {
    let mut link = TelemetryLink::new();

    // Feed the whole stream, then again in small slices (chunking must
    // not change the invariants).
    link.push_rx_bytes(data);
    assert!(link.rx_buffered() <= 128);
    assert!(link.pending_commands() <= 16);

    let mut link2 = TelemetryLink::new();
    for chunk in data.chunks(3) {
        link2.push_rx_bytes(chunk);
        assert!(link2.rx_buffered() <= 128);
        assert!(link2.pending_commands() <= 16);
    }

    while let Some(cmd) = link.next_command() {
        // Completed lines are valid UTF-8 by construction.
        assert!(cmd.len() <= 128);
    }
});
