//! Fuzz target for `datums{N}.lst` parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_core::dictionary::DatumDictionary;
use std::path::Path;

fuzz_target!(|data: &str| {
    let _ = DatumDictionary::parse("1", data, Path::new("datums1.lst"));
});
