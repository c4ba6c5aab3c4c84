//! Request and response bodies exchanged with the service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::TestId;

/// Body of `POST /api/load`: one import/sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub framework: String,
    pub language: String,
    pub noempty: bool,
    #[serde(rename = "no-detach")]
    pub no_detach: bool,
    pub structure: bool,
    pub create: bool,
    pub sync: bool,
    pub tests: Vec<LoadTest>,
    /// Remote identifiers to mark inactive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detach: Vec<TestId>,
}

/// One local test inside a [`LoadRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTest {
    /// Temporary reference the response keys assigned identifiers by.
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TestId>,
    pub name: String,
    pub suites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub file: String,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Response of `POST /api/load`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Identifiers keyed by the request's temporary references, as sent.
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
}

impl LoadResponse {
    /// Parsed identifiers by reference. Unrecognized values are skipped so
    /// the tests they belong to can still be resolved another way.
    pub fn identifiers(&self) -> BTreeMap<&str, TestId> {
        self.ids
            .iter()
            .filter_map(|(reference, raw)| match TestId::parse_lenient(raw) {
                Ok(id) => Some((reference.as_str(), id)),
                Err(_) => {
                    warn!(reference = %reference, id = %raw, "Ignoring unrecognized identifier in import response");
                    None
                }
            })
            .collect()
    }
}

/// Response of `GET /api/test_data`.
///
/// Test keys are `name`, `suite#name` or `file#suite#name`; values are the
/// identifiers, in whatever form the service emits them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDataResponse {
    #[serde(default)]
    pub tests: BTreeMap<String, String>,
    #[serde(default)]
    pub suites: BTreeMap<String, String>,
}

/// Body of `POST /api/reporter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
}

/// Response of `POST /api/reporter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub uid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Body of `POST /api/reporter/{run}/testrun`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub tests: Vec<ReportedTest>,
    pub batch_index: u64,
}

/// One test result inside a [`BatchRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedTest {
    /// Identifier body without the `@T` prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub title: String,
    pub status: String,
    /// Milliseconds.
    pub run_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Body of `PUT /api/reporter/{run}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishRequest {
    pub status_event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_event: Option<String>,
}

impl FinishRequest {
    pub fn finish(publish: bool) -> Self {
        Self {
            status_event: "finish".to_string(),
            access_event: publish.then(|| "publish".to_string()),
        }
    }
}

/// Response of `PUT /api/reporter/{run}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishResponse {
    #[serde(default)]
    pub public_url: Option<String>,
}
