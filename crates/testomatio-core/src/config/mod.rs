//! Configuration management for testomatio.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `testomatio.toml` file
//! 3. Built-in defaults (lowest priority)
//!
//! Import listener parameters (`remove_ids`, `no_detach`, ...) are not part of
//! [`Config`]; they live in [`ImportOptions`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing API key. Set the TESTOMATIO environment variable.")]
    MissingApiKey,

    #[error("Conflicting options: {first} and {second} cannot be combined")]
    ConflictingFlags {
        first: &'static str,
        second: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service connection settings.
    pub api: ApiConfig,

    /// Result delivery settings.
    pub delivery: DeliveryConfig,

    /// Test run settings.
    pub run: RunConfig,

    /// Import (sync) settings.
    pub import: ImportConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Reads `./testomatio.toml` when present, otherwise starts from defaults.
    /// Environment variables are applied on top in both cases.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_file(DEFAULT_CONFIG_FILE);
        }

        Ok(Self::from_env())
    }

    /// Defaults with environment variable overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Malformed numeric values are ignored and the current value is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Service
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.api.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_URL).filter(|u| !u.is_empty()) {
            self.api.base_url = url;
        }

        // Delivery
        if let Some(secs) = lookup(ENV_REQUEST_INTERVAL).and_then(|v| parse_digits(&v)) {
            self.delivery.request_interval_secs = secs;
        }
        if let Some(n) = lookup(ENV_MAX_REQUEST_FAILURES)
            .and_then(|v| parse_digits(&v))
            .filter(|n| *n > 0)
        {
            self.delivery.max_request_failures = n as u32;
        }
        if let Some(size) = lookup(ENV_BATCH_SIZE).and_then(|v| parse_digits(&v)) {
            let size = size as usize;
            self.delivery.batch_size = if (1..=MAX_BATCH_SIZE).contains(&size) {
                size
            } else {
                DEFAULT_BATCH_SIZE
            };
        }
        if let Some(flag) = lookup(ENV_DISABLE_BATCH_UPLOAD) {
            self.delivery.disable_batch_upload = is_true(&flag);
        }

        // Run
        if let Some(run_id) = lookup(ENV_RUN).filter(|r| !r.is_empty()) {
            self.run.run_id = Some(run_id);
        }
        if let Some(flag) = lookup(ENV_PUBLISH) {
            self.run.publish = is_true(&flag);
        }
        if let Some(title) = lookup(ENV_TITLE) {
            self.run.title = Some(title);
        }
        if let Some(group) = lookup(ENV_RUNGROUP_TITLE) {
            self.run.group_title = Some(group);
        }

        // Import
        if let Some(dir) = lookup(ENV_IMPORT_DIRECTORY) {
            self.import.directory = Some(dir);
        }
        if let Some(labels) = lookup(ENV_SYNC_LABELS) {
            self.import.sync_labels = split_labels(&labels);
        }
    }

    /// Checks that the configuration can be used for network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingApiKey);
        }
        if self.delivery.max_request_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_request_failures must be at least 1".to_string(),
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Service connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Project API key.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Service base URL.
    pub base_url: String,

    /// Timeout for a single request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Result delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base pacing delay between attempts, in seconds.
    pub request_interval_secs: u64,

    /// Maximum attempts per request, including the first.
    pub max_request_failures: u32,

    /// Results per batch (1..=100).
    pub batch_size: usize,

    /// Upload every result on its own.
    pub disable_batch_upload: bool,

    /// Upper bound for a single pacing delay, in seconds.
    pub max_retry_delay_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            request_interval_secs: DEFAULT_REQUEST_INTERVAL_SECS,
            max_request_failures: DEFAULT_MAX_REQUEST_FAILURES,
            batch_size: DEFAULT_BATCH_SIZE,
            disable_batch_upload: false,
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY_SECS,
        }
    }
}

impl DeliveryConfig {
    /// The batch size actually used by the queue.
    ///
    /// Always 1 when batch upload is disabled; out-of-range values fall back
    /// to the default.
    pub fn effective_batch_size(&self) -> usize {
        if self.disable_batch_upload {
            1
        } else if (1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            self.batch_size
        } else {
            DEFAULT_BATCH_SIZE
        }
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }
}

/// Test run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Existing run to report into; no run is created when set.
    pub run_id: Option<String>,

    /// Publish the run and print its public URL.
    pub publish: bool,

    /// Run title.
    pub title: Option<String>,

    /// Run group title.
    pub group_title: Option<String>,
}

/// Import configuration shared by every sync invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Directory prefix for imported file paths.
    pub directory: Option<String>,

    /// Labels attached to every imported test.
    pub sync_labels: Vec<String>,
}

/// Import listener parameters.
///
/// Each flag modifies how the reconciler builds its plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Strip identifiers from source files instead of syncing.
    pub remove_ids: bool,
    /// Do not detach remote tests missing from the source tree.
    pub no_detach: bool,
    /// Ask the service to remove suites left empty.
    pub no_empty: bool,
    /// Create remote tests with the identifiers found in source.
    pub create: bool,
    /// Force the local folder structure onto the project.
    pub structure: bool,
}

impl ImportOptions {
    /// Rejects flag combinations with ambiguous intent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.structure && self.no_empty {
            return Err(ConfigError::ConflictingFlags {
                first: "structure",
                second: "no_empty",
            });
        }
        Ok(())
    }
}

fn parse_digits(value: &str) -> Option<u64> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// Returns true for the accepted spellings of a boolean `true`.
pub fn is_true(value: &str) -> bool {
    TRUE_VARIANTS.contains(&value)
}

/// Splits a comma-separated label list, dropping empty entries.
pub fn split_labels(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_env(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_URL);
        assert_eq!(config.delivery.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.delivery.max_request_failures, DEFAULT_MAX_REQUEST_FAILURES);
        assert!(config.run.run_id.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = with_env(&[
            (ENV_API_KEY, "tstmt_key"),
            (ENV_URL, "https://beta.testomat.io/"),
            (ENV_REQUEST_INTERVAL, "10"),
            (ENV_MAX_REQUEST_FAILURES, "12"),
            (ENV_RUN, "run-42"),
            (ENV_TITLE, "Nightly"),
        ]);
        assert_eq!(config.api.api_key.as_deref(), Some("tstmt_key"));
        assert_eq!(config.api.base_url(), "https://beta.testomat.io");
        assert_eq!(config.delivery.request_interval_secs, 10);
        assert_eq!(config.delivery.max_request_failures, 12);
        assert_eq!(config.run.run_id.as_deref(), Some("run-42"));
        assert_eq!(config.run.title.as_deref(), Some("Nightly"));
    }

    #[test]
    fn test_malformed_numbers_keep_defaults() {
        let config = with_env(&[
            (ENV_REQUEST_INTERVAL, "-1"),
            (ENV_MAX_REQUEST_FAILURES, "five"),
        ]);
        assert_eq!(config.delivery.request_interval_secs, DEFAULT_REQUEST_INTERVAL_SECS);
        assert_eq!(config.delivery.max_request_failures, DEFAULT_MAX_REQUEST_FAILURES);
    }

    #[test]
    fn test_batch_size_ceiling() {
        assert_eq!(with_env(&[(ENV_BATCH_SIZE, "100")]).delivery.batch_size, 100);
        assert_eq!(with_env(&[(ENV_BATCH_SIZE, "101")]).delivery.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(with_env(&[(ENV_BATCH_SIZE, "0")]).delivery.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_boolean_variants() {
        for value in TRUE_VARIANTS {
            assert!(with_env(&[(ENV_PUBLISH, value)]).run.publish);
        }
        for value in ["false", "0", "yes", ""] {
            assert!(!with_env(&[(ENV_DISABLE_BATCH_UPLOAD, value)]).delivery.disable_batch_upload);
        }
    }

    #[test]
    fn test_disabled_batch_upload_forces_single_results() {
        let config = with_env(&[(ENV_DISABLE_BATCH_UPLOAD, "1"), (ENV_BATCH_SIZE, "20")]);
        assert_eq!(config.delivery.effective_batch_size(), 1);
    }

    #[test]
    fn test_sync_labels() {
        let config = with_env(&[(ENV_SYNC_LABELS, "smoke, regression,,ui ")]);
        assert_eq!(config.import.sync_labels, vec!["smoke", "regression", "ui"]);
    }

    #[test]
    fn test_validate_requires_api_key() {
        assert!(matches!(Config::default().validate(), Err(ConfigError::MissingApiKey)));
        assert!(with_env(&[(ENV_API_KEY, "key")]).validate().is_ok());
    }

    #[test]
    fn test_structure_and_no_empty_conflict() {
        let options = ImportOptions {
            structure: true,
            no_empty: true,
            ..ImportOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ConflictingFlags { .. })
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[api]
base_url = "http://localhost:3000"

[delivery]
batch_size = 25
request_interval_secs = 1
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:3000");
        assert_eq!(config.delivery.batch_size, 25);
        assert_eq!(config.delivery.request_interval_secs, 1);
        assert_eq!(config.delivery.max_request_failures, DEFAULT_MAX_REQUEST_FAILURES);
    }
}
