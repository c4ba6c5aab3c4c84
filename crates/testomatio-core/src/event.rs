//! Host runner lifecycle events.
//!
//! The host calls the listeners directly, or a recorded stream of these
//! events (one JSON object per line) is replayed into them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::report::Status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    SuiteStart {
        name: String,
        #[serde(default)]
        source: Option<PathBuf>,
    },
    TestStart(TestInfo),
    TestEnd {
        #[serde(flatten)]
        test: TestInfo,
        #[serde(flatten)]
        outcome: TestOutcome,
    },
    SuiteEnd {
        name: String,
    },
    RunEnd,
}

/// Static metadata of a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<PathBuf>,
}

impl TestInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Result of one test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub status: Status,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

impl TestOutcome {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            duration_ms: 0.0,
            message: None,
            stack: None,
        }
    }
}

impl HostEvent {
    /// Parses one line of a recorded event stream. Blank lines yield `None`.
    pub fn from_json_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}
