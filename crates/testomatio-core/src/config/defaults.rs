//! Default values for testomatio configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Service Defaults
// ============================================================================

/// Default Testomat.io service URL.
pub const DEFAULT_URL: &str = "https://app.testomat.io";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Project-local configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "testomatio.toml";

// ============================================================================
// Delivery Defaults
// ============================================================================

/// Default pacing delay between attempts, in seconds.
pub const DEFAULT_REQUEST_INTERVAL_SECS: u64 = 5;

/// Default number of attempts before a request is given up.
pub const DEFAULT_MAX_REQUEST_FAILURES: u32 = 5;

/// Default number of results per uploaded batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Hard ceiling for the batch size accepted by the service.
pub const MAX_BATCH_SIZE: usize = 100;

/// Upper bound for a single pacing delay after exponential growth, in seconds.
pub const DEFAULT_MAX_RETRY_DELAY_SECS: u64 = 60;

// ============================================================================
// Import Defaults
// ============================================================================

/// Framework name sent with imported tests.
pub const DEFAULT_FRAMEWORK: &str = "pytest";

/// Language name sent with imported tests.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Values accepted as `true` for boolean environment variables.
pub const TRUE_VARIANTS: &[&str] = &["True", "true", "TRUE", "1"];

// ============================================================================
// Environment Variables
// ============================================================================

pub const ENV_API_KEY: &str = "TESTOMATIO";
pub const ENV_URL: &str = "TESTOMATIO_URL";
pub const ENV_REQUEST_INTERVAL: &str = "TESTOMATIO_REQUEST_INTERVAL";
pub const ENV_MAX_REQUEST_FAILURES: &str = "TESTOMATIO_MAX_REQUEST_FAILURES";
pub const ENV_IMPORT_DIRECTORY: &str = "TESTOMATIO_IMPORT_DIRECTORY";
pub const ENV_SYNC_LABELS: &str = "TESTOMATIO_SYNC_LABELS";
pub const ENV_DISABLE_BATCH_UPLOAD: &str = "TESTOMATIO_DISABLE_BATCH_UPLOAD";
pub const ENV_BATCH_SIZE: &str = "TESTOMATIO_BATCH_SIZE";
pub const ENV_RUN: &str = "TESTOMATIO_RUN";
pub const ENV_PUBLISH: &str = "TESTOMATIO_PUBLISH";
pub const ENV_TITLE: &str = "TESTOMATIO_TITLE";
pub const ENV_RUNGROUP_TITLE: &str = "TESTOMATIO_RUNGROUP_TITLE";
