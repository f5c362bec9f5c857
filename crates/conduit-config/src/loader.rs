//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! defaults, files, `.env` files and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConduitConfig, ConfigError, LogFormat};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "CONDUIT";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables, optionally seeded from a `.env` file
///
/// # Example
///
/// ```no_run
/// use conduit_config::ConfigLoader;
///
/// # fn main() -> Result<(), conduit_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("conduit.toml")?
///     .with_dotenv()?
///     .with_env_prefix("CONDUIT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: ConduitConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ConduitConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = ConduitConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = ConduitConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = ConduitConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist or cannot be read
    /// - The extension is not supported
    /// - The content is invalid or contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[pipeline.retry]\nmax_retries = 5", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pipeline.retry.max_retries, 5);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::unsupported_format(format)),
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `CONDUIT__PIPELINE__RETRY__MAX_RETRIES=5`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the current directory or its parents into
    /// the process environment. A missing file is not an error.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self)
    }

    /// Load a specific `.env` file into the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Apply environment overrides and validate.
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// assert_eq!(config.host.service_name, "conduit-service");
    /// ```
    pub fn load(mut self) -> Result<ConduitConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_overrides(env::vars(), &prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without applying overrides or validating.
    #[must_use]
    pub fn load_unvalidated(self) -> ConduitConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<ConduitConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::unsupported_format(path.display().to_string())),
        }
    }

    fn apply_overrides<I>(&mut self, vars: I, prefix: &str) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars.into_iter().filter(|(k, _)| k.starts_with(&marker)) {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["HOST", "SERVICE_NAME"] => config.host.service_name = value.to_string(),
            ["HOST", "ENVIRONMENT"] => config.host.environment = value.to_string(),
            ["HOST", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.host.shutdown_timeout_secs = parse_number(key, value)?;
            }

            ["PIPELINE", "RETRY", "MAX_RETRIES"] => {
                config.pipeline.retry.max_retries = parse_number(key, value)?;
            }
            ["PIPELINE", "RETRY", "RETRY_DELAY_MS"] => {
                config.pipeline.retry.retry_delay_ms = parse_number(key, value)?;
            }
            ["PIPELINE", "TIMEOUT", "DEFAULT_MS"] => {
                config.pipeline.timeout.default_ms = parse_number(key, value)?;
            }
            ["PIPELINE", "TRUST_REQUEST_ID"] => {
                config.pipeline.trust_request_id = parse_flag(key, value)?;
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_lowercase(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => config.logging.ansi_enabled = parse_flag(key, value)?,

            _ => tracing::debug!(key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, ConduitConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.host.environment, "production");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"pipeline": {"timeout": {"default_ms": 750}}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.pipeline.timeout.default_ms, 750);
        assert_eq!(config.pipeline.retry.max_retries, 3);
    }

    #[test]
    fn test_loader_with_string_unknown_format() {
        let result = ConfigLoader::new().with_string("a: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[server]\nport = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/conduit.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/conduit.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.host.service_name, "conduit-service");
    }

    #[test]
    fn test_load_unvalidated_skips_validation() {
        let config = ConfigLoader::new()
            .with_string("[pipeline.timeout]\ndefault_ms = 0", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.pipeline.timeout.default_ms, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_overrides(
                vars(&[
                    ("TEST__HOST__SERVICE_NAME", "orders"),
                    ("TEST__PIPELINE__RETRY__MAX_RETRIES", "5"),
                    ("TEST__PIPELINE__RETRY__RETRY_DELAY_MS", "20"),
                    ("TEST__PIPELINE__TIMEOUT__DEFAULT_MS", "1500"),
                    ("TEST__PIPELINE__TRUST_REQUEST_ID", "yes"),
                    ("TEST__LOGGING__FORMAT", "Pretty"),
                    ("TEST__LOGGING__LEVEL", "DEBUG"),
                ]),
                "TEST",
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.host.service_name, "orders");
        assert_eq!(config.pipeline.retry.max_retries, 5);
        assert_eq!(config.pipeline.retry.retry_delay_ms, 20);
        assert_eq!(config.pipeline.timeout.default_ms, 1500);
        assert!(config.pipeline.trust_request_id);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_apply_env_var_ignores_other_prefixes_and_unknown_keys() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_overrides(
                vars(&[
                    ("OTHER__HOST__SERVICE_NAME", "nope"),
                    ("TESTING__HOST__SERVICE_NAME", "nope"),
                    ("TEST__HOST__UNKNOWN", "ignored"),
                ]),
                "TEST",
            )
            .unwrap();
        assert_eq!(loader.load_unvalidated().host.service_name, "conduit-service");
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_var("TEST__PIPELINE__RETRY__MAX_RETRIES", "lots", "TEST")
            .unwrap_err();
        assert!(err.to_string().contains("expected integer"));

        let err = loader
            .apply_env_var("TEST__LOGGING__ENABLED", "sometimes", "TEST")
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));

        let err = loader
            .apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }
}
