//! Fuzz target for snapshot file name and date token parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_common::{DateToken, SnapshotFile};

fuzz_target!(|data: &str| {
    if let Ok(token) = DateToken::parse(data) {
        let _ = token.window();
        let _ = token.hour_start();
    }
    let _ = SnapshotFile::from_path(data);
});
