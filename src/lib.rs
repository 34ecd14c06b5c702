#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
// Control flow style
#![allow(clippy::items_after_statements)]
#![allow(clippy::manual_let_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
// Option/Result patterns
#![allow(clippy::option_if_let_else)]
// Type defaults
#![allow(clippy::default_trait_access)]
#![allow(clippy::implicit_hasher)]
// Explicit type bounds
#![allow(clippy::significant_drop_tightening)]

//! Sessioncore - session consistency and last-will delivery for a clustered MQTT broker.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Wiring of auth, will delivery and cluster events
//! - `core::scheduler` - Single-worker delayed task scheduler
//! - `core::time` - Clock abstraction
//!
//! ## Authentication
//! - `auth` - Provider contract and the ordered authentication chain
//!
//! ## MQTT
//! - `mqtt::protocol` - Publish messages and properties
//! - `mqtt::session` - Session identity and disconnect reasons
//! - `mqtt::will` - Last-will lifecycle manager
//! - `mqtt::dispatch` - Message dispatch boundary
//! - `mqtt::retained` - Retained message processing
//!
//! ## Queue
//! - `queue` - Producer/consumer channels with caller-controlled offsets
//! - `queue::memory` - In-memory partitioned log backing both channels
//! - `queue::cluster` - Cluster event channel factory
//!
//! ## Operations
//! - `ops::telemetry` - Tracing initialisation and stats snapshots
//!
//! ## CLI
//! - `cli` - Command-line entrypoint definitions

// Core infrastructure
pub mod core;

// Authentication
pub mod auth;

// MQTT session state
pub mod mqtt;

// Cluster queue channels
pub mod queue;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime, scheduler, time};
pub use auth::{AuthContext, AuthProvider, AuthResponse, AuthenticationChain, AuthenticationError};
pub use mqtt::will::LastWillService;
pub use ops::telemetry;
