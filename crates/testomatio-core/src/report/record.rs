use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ReportedTest;
use crate::codec::{self, TestId};

/// Outcome of a single test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[serde(alias = "PASS", alias = "pass")]
    Passed,
    #[serde(alias = "FAIL", alias = "fail")]
    Failed,
    #[serde(alias = "SKIP", alias = "skip")]
    Skipped,
    #[serde(alias = "ERROR")]
    Error,
}

impl Status {
    /// Status string the service accepts. Errors are reported as failures.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed | Status::Error => "failed",
            Status::Skipped => "skipped",
        }
    }
}

/// One reported outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Identifier if the test name carries one.
    pub test_id: Option<TestId>,
    /// Test name without the identifier.
    pub title: String,
    /// Enclosing suites, outermost first.
    pub suite_path: Vec<String>,
    pub file: Option<String>,
    pub status: Status,
    pub duration_ms: f64,
    pub message: Option<String>,
    pub stack: Option<String>,
    pub tags: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Creates a record from a declared test name, extracting its identifier.
    pub fn new(declared_name: &str, status: Status) -> Self {
        let (title, test_id) = codec::extract(declared_name);
        Self {
            test_id,
            title,
            suite_path: Vec::new(),
            file: None,
            status,
            duration_ms: 0.0,
            message: None,
            stack: None,
            tags: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn with_suite_path(mut self, suite_path: Vec<String>) -> Self {
        self.suite_path = suite_path;
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_message(mut self, message: Option<String>, stack: Option<String>) -> Self {
        self.message = message.filter(|m| !m.is_empty());
        self.stack = stack.filter(|s| !s.is_empty());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Body sent to the service for this record.
    pub fn to_wire(&self) -> ReportedTest {
        ReportedTest {
            test_id: self.test_id.as_ref().map(|id| id.body().to_string()),
            title: self.title.clone(),
            status: self.status.wire_name().to_string(),
            run_time: self.duration_ms,
            suite_title: self.suite_path.last().cloned(),
            file: self.file.clone(),
            message: self.message.clone(),
            stack: self.stack.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_aliases() {
        let status: Status = serde_json::from_str("\"PASS\"").unwrap();
        assert_eq!(status, Status::Passed);
        let status: Status = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(status, Status::Skipped);
        assert_eq!(Status::Error.wire_name(), "failed");
    }

    #[test]
    fn test_wire_form() {
        let record = ResultRecord::new("Test Addition @T96c700e6", Status::Passed)
            .with_suite_path(vec!["Tests".into(), "Math".into()])
            .with_file("math.robot")
            .with_duration_ms(12.0)
            .with_message(Some(String::new()), None);

        let wire = serde_json::to_value(record.to_wire()).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({
                "test_id": "96c700e6",
                "title": "Test Addition",
                "status": "passed",
                "run_time": 12.0,
                "suite_title": "Math",
                "file": "math.robot",
            })
        );
    }

    #[test]
    fn test_record_without_identifier() {
        let record = ResultRecord::new("Unregistered", Status::Error);
        let wire = record.to_wire();
        assert!(wire.test_id.is_none());
        assert_eq!(wire.status, "failed");
        assert!(record.finished_at <= chrono::Utc::now());
    }
}
