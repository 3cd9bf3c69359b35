//! Fuzz target for snapshot record decoding.
//!
//! Arbitrary bytes must decode to records or an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_core::decode::{decode_all, ByteOrder, DecodeMode};

fuzz_target!(|data: &[u8]| {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        if let Ok(records) = decode_all(data, DecodeMode::UntilEof, order) {
            assert_eq!(records.len(), (data.len() - 8) / 12);
            for record in &records {
                let _ = record.absolute_time_nanos();
            }
        }
        let _ = decode_all(data, DecodeMode::Fixed(100), order);
    }
});
