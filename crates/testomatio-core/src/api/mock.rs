//! In-memory stand-in for the Testomat.io service.
//!
//! Used by `--dry-run` in the CLI and by tests. It keeps a tiny project
//! (identifiers keyed the way `/api/test_data` reports them), records every
//! call, and can be scripted to fail specific endpoints.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::types::{
    BatchRequest, CreateRunRequest, FinishRequest, FinishResponse, LoadRequest, LoadResponse,
    RunDetails, TestDataResponse,
};
use super::{TestomatApi, TransportError};
use crate::codec::TestId;

/// Endpoint selector for scripted failures and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Load,
    TestData,
    CreateRun,
    UploadBatch,
    FinishRun,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    LoadTests(LoadRequest),
    FetchTestData,
    CreateRun(CreateRunRequest),
    UploadBatch { run_id: String, request: BatchRequest },
    FinishRun { run_id: String, request: FinishRequest },
}

impl ApiCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiCall::LoadTests(_) => Endpoint::Load,
            ApiCall::FetchTestData => Endpoint::TestData,
            ApiCall::CreateRun(_) => Endpoint::CreateRun,
            ApiCall::UploadBatch { .. } => Endpoint::UploadBatch,
            ApiCall::FinishRun { .. } => Endpoint::FinishRun,
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<ApiCall>,
    scripted: HashMap<Endpoint, VecDeque<TransportError>>,
    always: HashMap<Endpoint, TransportError>,
    tests: BTreeMap<String, TestId>,
    suites: BTreeMap<String, String>,
    detached: Vec<TestId>,
    issued: VecDeque<String>,
    next_id: u32,
    runs: u32,
    omit_load_ids: bool,
}

impl MockState {
    fn knows(&self, id: &TestId) -> bool {
        self.tests.values().any(|known| known == id)
    }

    fn issue_id(&mut self) -> TestId {
        loop {
            let body = self.issued.pop_front().unwrap_or_else(|| {
                self.next_id += 1;
                format!("{:08x}", 0x1000_0000 + self.next_id)
            });
            if let Ok(id) = TestId::from_body(&body) {
                if !self.knows(&id) {
                    return id;
                }
            }
        }
    }

    fn take_failure(&mut self, endpoint: Endpoint) -> Option<TransportError> {
        if let Some(err) = self.scripted.get_mut(&endpoint).and_then(VecDeque::pop_front) {
            return Some(err);
        }
        self.always.get(&endpoint).cloned()
    }
}

/// In-memory [`TestomatApi`] implementation.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a remote test under a `test_data` key (`name`, `suite#name`
    /// or `file#suite#name`). Suite segments are registered as suites.
    pub fn with_remote_test(self, key: &str, id: &TestId) -> Self {
        {
            let mut state = self.lock();
            let parts: Vec<&str> = key.split('#').collect();
            if parts.len() >= 2 {
                let suite = parts[parts.len() - 2].to_string();
                let suite_id = format!("S{:07}", state.suites.len() + 1);
                state.suites.entry(suite).or_insert(suite_id);
            }
            state.tests.insert(key.to_string(), id.clone());
        }
        self
    }

    /// Identifier bodies handed out, in order, before generated ones.
    pub fn with_issued_ids<'a>(self, bodies: impl IntoIterator<Item = &'a str>) -> Self {
        self.lock().issued.extend(bodies.into_iter().map(str::to_string));
        self
    }

    /// Makes import responses omit the `ids` map, like older service versions.
    pub fn without_load_ids(self) -> Self {
        self.lock().omit_load_ids = true;
        self
    }

    /// Fails the next call to `endpoint` with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: TransportError) {
        self.lock()
            .scripted
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Fails every call to `endpoint` with `error`.
    pub fn fail_always(&self, endpoint: Endpoint, error: TransportError) {
        self.lock().always.insert(endpoint, error);
    }

    /// Stops failing `endpoint`.
    pub fn recover(&self, endpoint: Endpoint) {
        let mut state = self.lock();
        state.always.remove(&endpoint);
        state.scripted.remove(&endpoint);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Every upload attempt, including failed ones.
    pub fn upload_attempts(&self) -> Vec<BatchRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::UploadBatch { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent import request.
    pub fn last_load(&self) -> Option<LoadRequest> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            ApiCall::LoadTests(request) => Some(request.clone()),
            _ => None,
        })
    }

    /// Identifiers detached by import requests so far.
    pub fn detached(&self) -> Vec<TestId> {
        self.lock().detached.clone()
    }

    /// Current `test_data` view of the project.
    pub fn test_data(&self) -> TestDataResponse {
        let state = self.lock();
        TestDataResponse {
            tests: state
                .tests
                .iter()
                .map(|(key, id)| (key.clone(), id.to_string()))
                .collect(),
            suites: state.suites.clone(),
        }
    }

    fn record(&self, call: ApiCall) -> Result<MutexGuard<'_, MockState>, TransportError> {
        let endpoint = call.endpoint();
        let mut state = self.lock();
        state.calls.push(call);
        match state.take_failure(endpoint) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl TestomatApi for MockApi {
    async fn load_tests(&self, request: &LoadRequest) -> Result<LoadResponse, TransportError> {
        let mut state = self.record(ApiCall::LoadTests(request.clone()))?;

        let mut ids = BTreeMap::new();
        for test in &request.tests {
            let id = match &test.id {
                Some(id) if state.knows(id) || request.create => id.clone(),
                _ => state.issue_id(),
            };

            let key = match test.suites.last() {
                Some(suite) => {
                    let suite_id = format!("S{:07}", state.suites.len() + 1);
                    state.suites.entry(suite.clone()).or_insert(suite_id);
                    format!("{}#{}", suite, test.name)
                }
                None => test.name.clone(),
            };
            state.tests.retain(|_, known| *known != id);
            state.tests.insert(key, id.clone());
            ids.insert(test.reference.clone(), id.to_string());
        }

        for id in &request.detach {
            state.tests.retain(|_, known| known != id);
            state.detached.push(id.clone());
        }

        if state.omit_load_ids {
            ids.clear();
        }
        Ok(LoadResponse { ids })
    }

    async fn fetch_test_data(&self) -> Result<TestDataResponse, TransportError> {
        drop(self.record(ApiCall::FetchTestData)?);
        Ok(self.test_data())
    }

    async fn create_run(&self, request: &CreateRunRequest) -> Result<RunDetails, TransportError> {
        let mut state = self.record(ApiCall::CreateRun(request.clone()))?;
        state.runs += 1;
        let uid = format!("run{:05}", state.runs);
        let public_url = request
            .access_event
            .as_deref()
            .filter(|event| *event == "publish")
            .map(|_| format!("https://app.testomat.io/public/{}", uid));
        Ok(RunDetails {
            url: Some(format!("https://app.testomat.io/runs/{}", uid)),
            public_url,
            uid,
        })
    }

    async fn upload_batch(&self, run_id: &str, request: &BatchRequest) -> Result<(), TransportError> {
        drop(self.record(ApiCall::UploadBatch {
            run_id: run_id.to_string(),
            request: request.clone(),
        })?);
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &str,
        request: &FinishRequest,
    ) -> Result<FinishResponse, TransportError> {
        drop(self.record(ApiCall::FinishRun {
            run_id: run_id.to_string(),
            request: request.clone(),
        })?);
        let public_url = request
            .access_event
            .is_some()
            .then(|| format!("https://app.testomat.io/public/{}", run_id));
        Ok(FinishResponse { public_url })
    }
}
