#![no_main]

//! Fuzz target for the OpenStep property-list codec.
//!
//! Anything that parses must serialize to text that parses back to the same value.

use libfuzzer_sys::fuzz_target;
use pushpatch_edit::openstep;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = openstep::parse(s) else {
        return;
    };
    let text = openstep::to_string(&value);
    let reparsed = openstep::parse(&text).expect("serialized output must parse");
    assert_eq!(reparsed, value);
});
