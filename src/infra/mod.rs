//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - application configuration (TOML loading, zone validation)
//! - `metrics` - lock-free counters with periodic reporting

pub mod config;
pub mod metrics;

pub use config::{Config, OutputMode};
pub use metrics::Metrics;
