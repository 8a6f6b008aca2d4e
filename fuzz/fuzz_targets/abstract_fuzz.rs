//! Abstraction fuzz target: match arbitrary bytes against a fixed grammar with sizes,
//! checksums, alternates and repetitions. The matcher must return a tree or an error,
//! within its backtracking budget, and never panic.
//! Build with: cargo fuzz run abstract_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const GRAMMAR: &str = r#"
symbol Fuzzed {
    tag:   alt(0x01, 0x02, integer(size = 8, interval = 16..31));
    len:   size(body, crc) as integer(size = 16);
    body:  repeat(raw(nb_bytes = 1..4), count = 0..8, delimiter = ",");
    name:  repeat(ascii(nb_chars = 1), until = nul);
    nul:   0x00;
    crc:   checksum(tag, body, name) as integer(size = 16);
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(symbol) = protovocab::parse(GRAMMAR) else {
        return;
    };
    let config = protovocab::CodecConfig::default().with_backtrack_budget(20_000);
    let Ok(codec) = protovocab::Codec::with_config(symbol, config) else {
        return;
    };
    let memory = protovocab::Memory::new();
    if let Ok(tree) = codec.abstract_data(&memory, data) {
        assert_eq!(tree.to_bytes(), data);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run abstract_fuzz");
}
