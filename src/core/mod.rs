//! Core runtime infrastructure.
//!
//! This module contains the essential components for running the session core:
//! - `config` - Configuration parsing and validation
//! - `runtime` - Component wiring, cluster event loop and shutdown
//! - `scheduler` - Single-worker delayed task execution
//! - `time` - Clock abstraction

pub mod config;
pub mod runtime;
pub mod scheduler;
pub mod time;

pub use config::*;
pub use runtime::*;
pub use scheduler::*;
pub use time::*;
