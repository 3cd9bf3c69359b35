//! Fuzz target for diagnostic bundle reading.
//!
//! Bundles are operator-supplied archives; malformed input must fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_bundle::BundleReader;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = BundleReader::from_bytes(data.to_vec()) {
        let _ = reader.verify_all();
    }
});
