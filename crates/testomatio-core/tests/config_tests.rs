use std::collections::HashMap;
use std::io::Write;

use testomatio_core::config::{
    ConfigError, DEFAULT_BATCH_SIZE, DEFAULT_MAX_REQUEST_FAILURES, DEFAULT_REQUEST_INTERVAL_SECS,
    DEFAULT_URL, ENV_API_KEY, ENV_BATCH_SIZE, ENV_IMPORT_DIRECTORY, ENV_RUNGROUP_TITLE,
};
use testomatio_core::{Config, ImportOptions, RetryPolicy};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.api.base_url, DEFAULT_URL);
    assert_eq!(config.delivery.request_interval_secs, DEFAULT_REQUEST_INTERVAL_SECS);
    assert_eq!(config.delivery.max_request_failures, DEFAULT_MAX_REQUEST_FAILURES);
    assert_eq!(config.delivery.effective_batch_size(), DEFAULT_BATCH_SIZE);
    assert!(!config.run.publish);
}

#[test]
fn test_config_to_toml_omits_api_key() {
    let mut config = Config::default();
    config.api.api_key = Some("tstmt_secret".to_string());
    let toml_str = toml::to_string_pretty(&config).unwrap();
    assert!(toml_str.contains("[api]"));
    assert!(toml_str.contains("[delivery]"));
    assert!(!toml_str.contains("tstmt_secret"));
    assert!(Config::default_config_string().contains("batch_size"));
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[run]
title = "Nightly"
publish = true

[import]
sync_labels = ["smoke"]
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.run.title.as_deref(), Some("Nightly"));
    assert!(config.run.publish);
    assert_eq!(config.import.sync_labels, vec!["smoke"]);
}

#[test]
fn test_config_from_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[delivery]\nbatch_size = \"many\"").unwrap();
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::ParseError(_))
    ));
    assert!(matches!(
        Config::from_file("/nonexistent/testomatio.toml"),
        Err(ConfigError::ReadError(_))
    ));
}

#[test]
fn test_env_overrides_file_values() {
    let mut config: Config = toml::from_str("[delivery]\nbatch_size = 20").unwrap();
    config.apply_overrides(lookup(&[
        (ENV_API_KEY, "key"),
        (ENV_BATCH_SIZE, "75"),
        (ENV_IMPORT_DIRECTORY, "suites"),
        (ENV_RUNGROUP_TITLE, "Release"),
    ]));
    assert_eq!(config.delivery.batch_size, 75);
    assert_eq!(config.import.directory.as_deref(), Some("suites"));
    assert_eq!(config.run.group_title.as_deref(), Some("Release"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_import_options_mutual_exclusion() {
    let options = ImportOptions {
        structure: true,
        no_empty: true,
        ..ImportOptions::default()
    };
    let err = options.validate().unwrap_err();
    assert!(err.to_string().contains("structure"));

    let ok = ImportOptions {
        structure: true,
        no_detach: true,
        create: true,
        ..ImportOptions::default()
    };
    assert!(ok.validate().is_ok());
}

#[test]
fn test_retry_policy_from_delivery_config() {
    let mut config = Config::default();
    config.delivery.max_request_failures = 2;
    config.delivery.request_interval_secs = 1;
    let policy = RetryPolicy::from_config(&config.delivery);
    assert_eq!(policy.max_attempts(), 2);
    assert_eq!(policy.backoff_delay(2).as_secs(), 2);
}

#[test]
fn test_zero_request_timeout_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[api]\nrequest_timeout_secs = 0").unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    config.api.api_key = Some("tstmt_key".to_string());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid(msg)) if msg.contains("request_timeout_secs")
    ));

    config.api.request_timeout_secs = 1;
    assert!(config.validate().is_ok());
}
