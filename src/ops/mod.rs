//! Operations and observability.
//!
//! - `telemetry` - Tracing initialisation and stats snapshots

pub mod telemetry;

pub use telemetry::*;
