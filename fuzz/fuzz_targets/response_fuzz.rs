//! Response fuzz target: arbitrary scanner bytes go through response framing and,
//! when they decode to a record, through the student-sheet validator. Garbled
//! bytes must come back as a fault, never as a record.
//! Build with: cargo fuzz run response_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use omrscan::codec::{read_response, Response};
    use omrscan::{Channel, MemoryChannel, RatingSheet, RecordValidator};
    use std::time::Duration;

    let mut ch = MemoryChannel::new();
    ch.push_inbound(data);
    match read_response(&mut ch, Duration::from_millis(1)) {
        Ok(Response::Payload(text)) => {
            assert!(text.is_ascii());
            let validator = RecordValidator::new(RatingSheet::student().policy()).expect("preset policy");
            if let Ok(v) = validator.validate_text(&text) {
                assert_eq!(v.record.tokens().len(), text.split(',').count());
            }
        }
        Ok(_) | Err(_) => {}
    }
    ch.discard_input();
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run response_fuzz");
}
