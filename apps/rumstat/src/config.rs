//! # Configuration
//!
//! `RumConfig` is read from an optional TOML file; every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [rageclick]
//! click_threshold = 10
//! min_percentage = 5.0
//! min_samples = 10
//! samples_override = 100
//! min_page_views = 5000.0
//!
//! [experiment]
//! control_variant = "control"
//! significance_threshold = 95.0
//!
//! [[url_groups]]
//! name = "Blog"
//! pattern = "https://www.example.com/blog/*"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//! body_limit_bytes = 33554432
//! max_concurrency = 64
//! ```
//!
//! ## Environment Overrides
//!
//! - `RUMSTAT_RATE_LIMIT`: requests per second, 0 disables
//! - `RUMSTAT_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `RUMSTAT_API_KEY`: read per request by the auth middleware
//! - `RUMSTAT_LOG_FORMAT`: `json` or `text`, read at startup

use crate::input::{MAX_INPUT_FILE_SIZE, validate_file_path, validate_file_size};
use rumstat_core::reports::{ExperimentOptions, RageClickOptions, UrlPattern};
use rumstat_core::{ReportOptions, RumError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default request body limit: 32 MB of bundles.
pub const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Default cap on requests processed at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

// =============================================================================
// SERVER SECTION
// =============================================================================

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second, 0 disables rate limiting.
    pub rate_limit: u32,
    /// Allowed CORS origins; `None` means localhost only.
    pub cors_origins: Option<Vec<String>>,
    pub body_limit_bytes: usize,
    /// Requests processed at once; further requests wait.
    pub max_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

// =============================================================================
// ROOT CONFIG
// =============================================================================

/// Whole configuration file; a missing section takes its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RumConfig {
    pub rageclick: RageClickOptions,
    pub experiment: ExperimentOptions,
    pub url_groups: Vec<UrlPattern>,
    pub server: ServerConfig,
}

impl RumConfig {
    /// Load from a TOML file, or defaults when no path is given.
    /// Environment overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self, RumError> {
        let mut config = match path {
            Some(path) => {
                let canonical = validate_file_path(path)?;
                validate_file_size(&canonical, MAX_INPUT_FILE_SIZE)?;
                let text = std::fs::read_to_string(&canonical)
                    .map_err(|e| RumError::IoError(format!("Cannot read config: {}", e)))?;
                let config = Self::from_toml_str(&text)?;
                tracing::info!(path = %canonical.display(), "configuration loaded");
                config
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse TOML text. Missing sections and fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, RumError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RumError::SerializationError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RumError> {
        for group in &self.url_groups {
            group.compile()?;
        }
        if self.server.max_concurrency == 0 {
            return Err(RumError::InvalidInput(
                "server.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.rageclick.click_threshold == 0 {
            return Err(RumError::InvalidInput(
                "rageclick.click_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `RUMSTAT_RATE_LIMIT` and `RUMSTAT_CORS_ORIGINS`.
    pub fn apply_env(&mut self) {
        if let Some(limit) = rate_limit_from_env() {
            self.server.rate_limit = limit;
        }
        if let Some(origins) = cors_origins_from_env() {
            self.server.cors_origins = Some(origins);
        }
    }

    /// Options handed to the report handlers.
    #[must_use]
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            experiment: self.experiment.clone(),
            rageclick: self.rageclick.clone(),
            url_groups: self.url_groups.clone(),
        }
    }
}

/// `RUMSTAT_RATE_LIMIT`, when set to a number.
pub fn rate_limit_from_env() -> Option<u32> {
    std::env::var("RUMSTAT_RATE_LIMIT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// `RUMSTAT_CORS_ORIGINS` split on commas, when set and non-empty.
pub fn cors_origins_from_env() -> Option<Vec<String>> {
    let raw = std::env::var("RUMSTAT_CORS_ORIGINS").ok()?;
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!origins.is_empty()).then_some(origins)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        let config = RumConfig::from_toml_str("").expect("parse");
        assert_eq!(config, RumConfig::default());
        assert_eq!(config.rageclick.click_threshold, 10);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn sections_override_defaults() {
        let config = RumConfig::from_toml_str(
            r#"
            [rageclick]
            click_threshold = 4
            samples_override = 40

            [experiment]
            control_variant = "baseline"

            [[url_groups]]
            name = "Blog"
            pattern = "https://a.com/blog/*"

            [server]
            port = 9000
            "#,
        )
        .expect("parse");

        assert_eq!(config.rageclick.click_threshold, 4);
        assert_eq!(config.rageclick.min_page_views, 5000.0);
        assert_eq!(config.rageclick.samples_override, 40);
        assert_eq!(config.rageclick.min_samples, 10);
        assert_eq!(config.experiment.control_variant, "baseline");
        assert_eq!(config.experiment.significance_threshold, 95.0);
        assert_eq!(config.url_groups.len(), 1);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");

        let options = config.report_options();
        assert_eq!(options.url_groups[0].name, "Blog");
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(RumConfig::from_toml_str("[rageclick]\nclick_threshold = 0").is_err());
        assert!(RumConfig::from_toml_str("[server]\nport = \"eighty\"").is_err());
        assert!(RumConfig::from_toml_str("[server]\nmax_concurrency = 0").is_err());
    }
}
