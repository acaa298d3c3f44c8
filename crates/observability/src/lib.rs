//! Tracing/logging setup shared by the billing binaries.

pub mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
