use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::{
    BatchRequest, CreateRunRequest, FinishRequest, FinishResponse, LoadRequest, LoadResponse,
    RunDetails, TestDataResponse,
};
use super::{TestomatApi, TransportError};
use crate::config::{ApiConfig, ConfigError};

/// HTTP client for the Testomat.io API.
///
/// Every request carries the project API key and is bounded by the
/// configured timeout. Proxy settings (`HTTP_PROXY`, `HTTPS_PROXY`) are
/// picked up from the environment by the underlying client.
pub struct HttpClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl HttpClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `base_url` - The service URL (e.g., "https://app.testomat.io")
    /// * `api_key` - The project API key
    /// * `timeout` - Upper bound for a single request
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Creates a client from the `[api]` configuration section.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Self::new(config.base_url(), api_key, config.request_timeout())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maps non-2xx responses to errors.
    async fn check(response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(TransportError::from_status(status.as_u16(), message))
    }

    /// Decodes a JSON body, treating an empty body as the default value.
    async fn decode_or_default<T>(response: Response) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Default,
    {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        with_key: bool,
    ) -> Result<Response, TransportError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if with_key {
            request = request.query(&[("api_key", &self.api_key)]);
        }
        let response = request.send().await?;
        Self::check(response).await
    }
}

#[async_trait]
impl TestomatApi for HttpClient {
    async fn load_tests(&self, request: &LoadRequest) -> Result<LoadResponse, TransportError> {
        debug!(tests = request.tests.len(), detach = request.detach.len(), "Sending import request");
        let response = self.post_json("/api/load", request, true).await?;
        Self::decode_or_default(response).await
    }

    async fn fetch_test_data(&self) -> Result<TestDataResponse, TransportError> {
        let response = self
            .client
            .get(self.url("/api/test_data"))
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn create_run(&self, request: &CreateRunRequest) -> Result<RunDetails, TransportError> {
        #[derive(Serialize)]
        struct Body<'a> {
            api_key: &'a str,
            #[serde(flatten)]
            run: &'a CreateRunRequest,
        }

        let body = Body {
            api_key: &self.api_key,
            run: request,
        };
        let response = self.post_json("/api/reporter", &body, false).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn upload_batch(&self, run_id: &str, request: &BatchRequest) -> Result<(), TransportError> {
        let path = format!("/api/reporter/{}/testrun", run_id);
        self.post_json(&path, request, true).await?;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &str,
        request: &FinishRequest,
    ) -> Result<FinishResponse, TransportError> {
        let response = self
            .client
            .put(self.url(&format!("/api/reporter/{}", run_id)))
            .query(&[("api_key", &self.api_key)])
            .json(request)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Self::decode_or_default(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new(
            "https://app.testomat.io",
            "tstmt_key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://app.testomat.io");
        assert_eq!(client.url("/api/load"), "https://app.testomat.io/api/load");
    }

    #[test]
    fn test_url_trailing_slash_removed() {
        let client =
            HttpClient::new("https://beta.testomat.io/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://beta.testomat.io");
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ApiConfig::default();
        assert!(matches!(
            HttpClient::from_config(&config),
            Err(ConfigError::MissingApiKey)
        ));

        let config = ApiConfig {
            api_key: Some("key".to_string()),
            ..ApiConfig::default()
        };
        assert!(HttpClient::from_config(&config).is_ok());
    }
}
