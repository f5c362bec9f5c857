//! Main configuration types.
//!
//! This module provides the top-level [`ConduitConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, HostConfig, LogFormat, LoggingConfig, PipelineConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete Conduit configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use conduit_config::ConduitConfig;
///
/// let config = ConduitConfig::default();
/// assert_eq!(config.pipeline.retry.max_retries, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConduitConfig {
    /// Application host configuration.
    #[serde(default)]
    pub host: HostConfig,

    /// Pipeline combinator defaults.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConduitConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::{ConduitConfig, HostConfig};
    ///
    /// let config = ConduitConfig::builder()
    ///     .host(HostConfig {
    ///         service_name: "orders".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.host.service_name, "orders");
    /// ```
    #[must_use]
    pub fn builder() -> ConduitConfigBuilder {
        ConduitConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The service name is empty
    /// - The default timeout is zero
    /// - The log level is not a known level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "host.service_name",
                "must not be empty",
            ));
        }

        if self.pipeline.timeout.default_ms == 0 {
            return Err(ConfigError::invalid_value(
                "pipeline.timeout.default_ms",
                "must be greater than zero",
            ));
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("unknown level '{}'", self.logging.level),
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with ANSI colors
    /// - Debug log level
    /// - Short retry delay and a trusted request ID header
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConduitConfig;
    ///
    /// let config = ConduitConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi_enabled = true;

        config.host.environment = "development".to_string();

        config.pipeline.retry.retry_delay_ms = 100;
        config.pipeline.trust_request_id = true;

        config
    }

    /// Create a production configuration preset.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::{ConduitConfig, LogFormat};
    ///
    /// let config = ConduitConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi_enabled = false;

        config.host.environment = "production".to_string();

        config.pipeline.trust_request_id = false;

        config
    }
}

/// Builder for [`ConduitConfig`].
#[derive(Debug, Default)]
pub struct ConduitConfigBuilder {
    host: Option<HostConfig>,
    pipeline: Option<PipelineConfig>,
    logging: Option<LoggingConfig>,
}

impl ConduitConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host configuration.
    #[must_use]
    pub fn host(mut self, host: HostConfig) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the pipeline configuration.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections use their default values.
    #[must_use]
    pub fn build(self) -> ConduitConfig {
        ConduitConfig {
            host: self.host.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<ConduitConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
