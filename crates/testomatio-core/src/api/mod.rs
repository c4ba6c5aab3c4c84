mod client;
mod error;
pub mod mock;
pub mod types;

pub use client::HttpClient;
pub use error::{TransportError, FORBIDDEN_MESSAGE};
pub use mock::{ApiCall, Endpoint, MockApi};
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;

/// The Testomat.io endpoints used by import and reporting.
///
/// This abstraction lets the sync transport, run session and delivery
/// pipeline run against the real service or an in-memory fake.
///
/// # Example
///
/// ```ignore
/// use testomatio_core::api::{HttpClient, TestomatApi};
///
/// let api = HttpClient::from_config(&config.api)?;
/// let snapshot = api.fetch_test_data().await?;
/// ```
#[async_trait]
pub trait TestomatApi: Send + Sync {
    /// Sends one import request (`POST /api/load`).
    async fn load_tests(&self, request: &LoadRequest) -> Result<LoadResponse, TransportError>;

    /// Fetches the project's current test identifiers (`GET /api/test_data`).
    async fn fetch_test_data(&self) -> Result<TestDataResponse, TransportError>;

    /// Creates a test run (`POST /api/reporter`).
    async fn create_run(&self, request: &CreateRunRequest) -> Result<RunDetails, TransportError>;

    /// Uploads one batch of results into a run.
    async fn upload_batch(&self, run_id: &str, request: &BatchRequest) -> Result<(), TransportError>;

    /// Finishes a run.
    async fn finish_run(
        &self,
        run_id: &str,
        request: &FinishRequest,
    ) -> Result<FinishResponse, TransportError>;
}

/// Shared handle used by components that outlive a single call.
pub type SharedApi = Arc<dyn TestomatApi>;

/// Blanket implementation for shared trait objects and shared fakes.
#[async_trait]
impl<T: TestomatApi + ?Sized> TestomatApi for Arc<T> {
    async fn load_tests(&self, request: &LoadRequest) -> Result<LoadResponse, TransportError> {
        (**self).load_tests(request).await
    }

    async fn fetch_test_data(&self) -> Result<TestDataResponse, TransportError> {
        (**self).fetch_test_data().await
    }

    async fn create_run(&self, request: &CreateRunRequest) -> Result<RunDetails, TransportError> {
        (**self).create_run(request).await
    }

    async fn upload_batch(&self, run_id: &str, request: &BatchRequest) -> Result<(), TransportError> {
        (**self).upload_batch(run_id, request).await
    }

    async fn finish_run(
        &self,
        run_id: &str,
        request: &FinishRequest,
    ) -> Result<FinishResponse, TransportError> {
        (**self).finish_run(run_id, request).await
    }
}
