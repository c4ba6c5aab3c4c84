//! The remote project's last-known state, fetched once per sync run.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::api::TestDataResponse;
use crate::codec::{self, TestId};

/// One test as the service knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTest {
    pub id: TestId,
    /// Title without any identifier token.
    pub title: String,
    /// Known suite placement, outermost first. Often just the parent suite.
    pub suite_path: Vec<String>,
    pub file: Option<String>,
    /// `None` when the service did not report tags for this test.
    pub tags: Option<BTreeSet<String>>,
}

impl RemoteTest {
    pub fn new(id: TestId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: codec::strip(&title.into()),
            suite_path: Vec::new(),
            file: None,
            tags: None,
        }
    }

    pub fn in_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite_path.push(suite.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether this test sits at the end of `suite_path` under `name`.
    /// A test without a known suite only matches tests outside any suite.
    fn matches_structure(&self, name: &str, suite_path: &[String]) -> bool {
        if self.title != name {
            return false;
        }
        if self.suite_path.is_empty() {
            return suite_path.is_empty();
        }
        suite_path.ends_with(&self.suite_path)
    }
}

/// Read-only view of the remote project, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSnapshot {
    tests: BTreeMap<TestId, RemoteTest>,
}

impl ProjectSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_tests(tests: impl IntoIterator<Item = RemoteTest>) -> Self {
        Self {
            tests: tests.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Builds a snapshot from a `test_data` response.
    ///
    /// Keys are `name`, `suite#name` or `file#suite#name`. Several keys may
    /// point at the same identifier; they are merged into one test.
    pub fn from_test_data(data: &TestDataResponse) -> Self {
        let mut tests: BTreeMap<TestId, RemoteTest> = BTreeMap::new();

        for (key, raw_id) in &data.tests {
            let id = match TestId::parse_lenient(raw_id) {
                Ok(id) => id,
                Err(_) => {
                    debug!(key = %key, id = %raw_id, "Skipping test with unrecognized identifier");
                    continue;
                }
            };

            let parts: Vec<&str> = key.split('#').collect();
            let Some(title) = parts.last() else { continue };

            let (file, suite) = match parts.as_slice() {
                [suite, _] if data.suites.contains_key(*suite) => (None, Some(*suite)),
                [file, .., suite, _] => (Some(*file), Some(*suite)),
                _ => (None, None),
            };

            let entry = tests
                .entry(id.clone())
                .or_insert_with(|| RemoteTest::new(id, *title));
            if entry.suite_path.is_empty() {
                if let Some(suite) = suite {
                    entry.suite_path.push(suite.to_string());
                }
            }
            if entry.file.is_none() {
                entry.file = file.map(str::to_string);
            }
        }

        Self { tests }
    }

    pub fn get(&self, id: &TestId) -> Option<&RemoteTest> {
        self.tests.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TestId> {
        self.tests.keys()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Remote tests whose title equals `name` and whose suite placement is a
    /// suffix of `suite_path`.
    pub fn find_structural(&self, name: &str, suite_path: &[String]) -> Vec<&RemoteTest> {
        self.tests
            .values()
            .filter(|t| t.matches_structure(name, suite_path))
            .collect()
    }
}
