use tracing::{info, warn};

use super::error::ReportError;
use crate::api::{CreateRunRequest, FinishRequest, SharedApi};
use crate::config::RunConfig;
use crate::retry::{run_with_retry, RetryPolicy};

/// Lifecycle of a run on the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No run yet; created on first use.
    Idle,
    Active {
        run_id: String,
        public_url: Option<String>,
    },
    /// Creation failed after every retry. Not retried within this process.
    Unavailable,
    Finished,
}

/// One test run on the service.
///
/// Owns the run token. At most one creation call is made per session, and
/// none when a run id is supplied through configuration.
pub struct RunSession {
    api: SharedApi,
    config: RunConfig,
    policy: RetryPolicy,
    state: SessionState,
}

impl RunSession {
    pub fn new(api: SharedApi, config: RunConfig, policy: RetryPolicy) -> Self {
        let state = match config.run_id.clone().filter(|id| !id.is_empty()) {
            Some(run_id) => SessionState::Active {
                run_id,
                public_url: None,
            },
            None => SessionState::Idle,
        };
        Self {
            api,
            config,
            policy,
            state,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn run_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Returns the run token, creating the run on first call.
    pub async fn ensure_session(&mut self) -> Result<String, ReportError> {
        match &self.state {
            SessionState::Active { run_id, .. } => return Ok(run_id.clone()),
            SessionState::Unavailable | SessionState::Finished => {
                return Err(ReportError::SessionUnavailable)
            }
            SessionState::Idle => {}
        }

        let request = CreateRunRequest {
            access_event: self.config.publish.then(|| "publish".to_string()),
            title: self.config.title.clone(),
            group_title: self.config.group_title.clone(),
        };

        let api = self.api.clone();
        let created = run_with_retry("create_run", &self.policy, || {
            let api = api.clone();
            let request = request.clone();
            async move { api.create_run(&request).await }
        })
        .await;

        match created {
            Ok(run) => {
                info!(
                    run = %run.uid,
                    url = run.url.as_deref().unwrap_or_default(),
                    "Test run created"
                );
                if self.config.publish {
                    if let Some(public_url) = &run.public_url {
                        info!(public_url = %public_url, "Public run url");
                    }
                }
                self.state = SessionState::Active {
                    run_id: run.uid.clone(),
                    public_url: run.public_url,
                };
                Ok(run.uid)
            }
            Err(err) => {
                warn!(error = %err, "Failed to create test run, results will not be reported");
                self.state = SessionState::Unavailable;
                Err(err.into())
            }
        }
    }

    /// Finishes the run. Returns the public URL when `publish` is set and
    /// the service provides one.
    ///
    /// A session that never started a run has nothing to finish.
    pub async fn finalize(&mut self, publish: bool) -> Result<Option<String>, ReportError> {
        let (run_id, cached_url) = match &self.state {
            SessionState::Active {
                run_id, public_url, ..
            } => (run_id.clone(), public_url.clone()),
            SessionState::Idle | SessionState::Finished => return Ok(None),
            SessionState::Unavailable => return Err(ReportError::SessionUnavailable),
        };

        let request = FinishRequest::finish(publish);
        let api = self.api.clone();
        let finished = run_with_retry("finish_run", &self.policy, || {
            let api = api.clone();
            let run_id = run_id.clone();
            let request = request.clone();
            async move { api.finish_run(&run_id, &request).await }
        })
        .await?;

        self.state = SessionState::Finished;
        info!(run = %run_id, "Test run finished");

        if !publish {
            return Ok(None);
        }
        let public_url = finished.public_url.or(cached_url);
        if let Some(url) = &public_url {
            info!(public_url = %url, "Run published");
        }
        Ok(public_url)
    }
}
