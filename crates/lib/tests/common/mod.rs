#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared setup for the integration tests in this crate.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("leadsync=debug")
            .with_test_writer()
            .init();
    });
}
