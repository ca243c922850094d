//! Structured logging setup.
//!
//! Log output is controlled by `[observability.logging]`, with `RUST_LOG`
//! taking precedence when set.

mod tracing_init;

pub use tracing_init::*;
