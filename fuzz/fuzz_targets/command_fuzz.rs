//! Command fuzz target: feed arbitrary text to the command parser and the
//! definition loader. Neither may panic; anything that parses must re-encode
//! to text that parses to the same command.
//! Build with: cargo fuzz run command_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(command) = omrscan::parse_command(s) {
        let again = omrscan::parse_command(&command.encode()).expect("re-encoded command must parse");
        assert_eq!(again, command);
    }
    let _ = omrscan::FormDefinition::parse(s);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run command_fuzz");
}
