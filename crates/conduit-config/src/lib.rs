//! Typed configuration for Conduit.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`ConduitConfig`] groups three sections:
//!
//! - [`HostConfig`] - service identity and shutdown grace period
//! - [`PipelineConfig`] - retry and timeout defaults for combinators
//! - [`LoggingConfig`] - log level and format
//!
//! # Configuration File Format
//!
//! ```toml
//! [host]
//! service_name = "orders"
//! environment = "production"
//! shutdown_timeout_secs = 30
//!
//! [pipeline]
//! trust_request_id = false
//!
//! [pipeline.retry]
//! max_retries = 3
//! retry_delay_ms = 1000
//!
//! [pipeline.timeout]
//! default_ms = 30000
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `CONDUIT__HOST__SERVICE_NAME=orders`
//! - `CONDUIT__PIPELINE__RETRY__MAX_RETRIES=5`
//! - `CONDUIT__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;
