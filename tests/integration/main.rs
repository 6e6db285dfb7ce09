//! Integration test binary. All integration tests are consolidated into a
//! single binary to keep link time down.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod config_roundtrip;
mod cost_fallback;
mod pipeline_e2e;
