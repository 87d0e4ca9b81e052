//! # elect-observability
//!
//! Logging and metrics setup for elect.
//!
//! This crate provides structured logging with tracing and the descriptions
//! of the metric series that electors emit.

pub mod logging;
pub mod metrics;

pub use crate::logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use crate::metrics::register_election_metrics;
