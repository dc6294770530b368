//! Preroller: pre-roll video ad plugin core
//!
//! Library interface for the demo binary, benchmarks and integration tests.

pub mod ad;
pub mod config;
pub mod error;
pub mod metrics;
pub mod player;
pub mod preroll;
