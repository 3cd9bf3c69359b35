//! Fuzz target for TOML configuration parsing and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sdb_config::{validate_config, ImportConfig};

fuzz_target!(|data: &str| {
    // Parse errors are expected; accepted configs must validate without panicking
    if let Ok(config) = ImportConfig::from_toml_str(data) {
        let _ = validate_config(&config);
    }
});
