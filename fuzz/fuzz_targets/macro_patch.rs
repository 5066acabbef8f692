#![no_main]

//! Fuzz target for preprocessor macro flipping.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pushpatch_edit::macros::{self, MacroFlags};

#[derive(Debug, Arbitrary)]
struct Input {
    text: String,
    location: bool,
    push: bool,
}

fuzz_target!(|input: Input| {
    let flags = MacroFlags {
        location_enabled: input.location,
        push_enabled: input.push,
    };
    let (once, _) = macros::patch(&input.text, flags);
    let (twice, changed) = macros::patch(&once, flags);
    assert!(!changed);
    assert_eq!(once, twice);
});
