//! Fuzz target for converter CSV parsing and line-protocol encoding.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_core::dictionary::{DatumDictionary, DatumEntry};
use sdb_core::encode::{encode, parse_rows};

fuzz_target!(|data: &[u8]| {
    let dictionary = DatumDictionary::new(
        "3",
        vec![
            DatumEntry { source: "ACS".to_string(), datum: "AZ".to_string() },
            DatumEntry { source: "ACS".to_string(), datum: "EL".to_string() },
        ],
    );
    // Malformed rows are an error, not a panic
    if let Ok(rows) = parse_rows(data, dictionary.len()) {
        let batch = encode(&rows, &dictionary, "sdbfull");
        assert!(batch.len() <= rows.len());
    }
});
