//! Parser fuzz target: feed arbitrary text to the grammar DSL parser, then resolve what
//! parses. Neither step may panic; both report errors as values.
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(symbols) = protovocab::parse_all(s) {
        for symbol in symbols {
            let _ = protovocab::Codec::new(symbol);
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
