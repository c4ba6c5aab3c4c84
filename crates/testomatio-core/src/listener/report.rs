use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{HttpClient, SharedApi};
use crate::config::{Config, ConfigError};
use crate::event::{HostEvent, TestInfo, TestOutcome};
use crate::report::{DeliveryPipeline, DeliveryReport, ResultRecord, RunSession};
use crate::retry::RetryPolicy;

/// What a reporting run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub run_id: Option<String>,
    pub public_url: Option<String>,
    pub delivery: DeliveryReport,
}

/// Streams test results into a run on the service.
///
/// Reporting problems are logged and never surface as errors to the host.
pub struct ReportListener {
    pipeline: Option<DeliveryPipeline>,
    publish: bool,
    suites: Vec<(String, Option<PathBuf>)>,
}

impl ReportListener {
    /// Starts the delivery worker. Must be called inside a Tokio runtime.
    pub fn new(api: SharedApi, config: &Config, policy: RetryPolicy) -> Self {
        let session = RunSession::new(api.clone(), config.run.clone(), policy.clone());
        let pipeline = DeliveryPipeline::spawn(
            api,
            session,
            policy,
            config.delivery.effective_batch_size(),
        );
        Self {
            pipeline: Some(pipeline),
            publish: config.run.publish,
            suites: Vec::new(),
        }
    }

    /// Builds a listener reporting to the configured service.
    ///
    /// Without an API key the listener is disabled.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match HttpClient::from_config(&config.api) {
            Ok(client) => Ok(Self::new(
                Arc::new(client),
                config,
                RetryPolicy::from_config(&config.delivery),
            )),
            Err(ConfigError::MissingApiKey) => {
                warn!("{}", ConfigError::MissingApiKey);
                Ok(Self::disabled())
            }
            Err(e) => Err(e),
        }
    }

    pub fn disabled() -> Self {
        Self {
            pipeline: None,
            publish: false,
            suites: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn start_suite(&mut self, name: &str, source: Option<&Path>) {
        self.suites
            .push((name.to_string(), source.map(Path::to_path_buf)));
    }

    pub fn start_test(&mut self, _test: &TestInfo) {}

    pub fn end_test(&mut self, test: &TestInfo, outcome: &TestOutcome) {
        let Some(pipeline) = &mut self.pipeline else {
            return;
        };

        let file = test
            .source
            .as_deref()
            .or_else(|| self.suites.iter().rev().find_map(|(_, s)| s.as_deref()))
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());

        let mut record = ResultRecord::new(&test.name, outcome.status)
            .with_suite_path(self.suites.iter().map(|(name, _)| name.clone()).collect())
            .with_duration_ms(outcome.duration_ms)
            .with_message(outcome.message.clone(), outcome.stack.clone())
            .with_tags(test.tags.clone());
        if let Some(file) = file {
            record = record.with_file(file);
        }

        if let Err(e) = pipeline.submit(record) {
            warn!(test = %test.name, error = %e, "Result not queued");
        }
    }

    /// Sends everything queued so far, including a partial batch.
    pub fn end_suite(&mut self, name: &str) {
        if let Some(position) = self.suites.iter().rposition(|(n, _)| n == name) {
            self.suites.truncate(position);
        }
        if let Some(pipeline) = &mut self.pipeline {
            if let Err(e) = pipeline.flush() {
                warn!(suite = name, error = %e, "Results not flushed");
            }
        }
    }

    /// Flushes the queue, waits for delivery and finishes the run.
    ///
    /// Only the first call does any work.
    pub async fn close(&mut self) -> Option<RunReport> {
        let pipeline = self.pipeline.take()?;

        let (mut session, delivery) = match pipeline.shutdown().await {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Delivery did not complete");
                return None;
            }
        };

        let run_id = session.run_id().map(str::to_string);
        let public_url = match session.finalize(self.publish).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Failed to finish test run");
                None
            }
        };
        info!(
            delivered = delivery.delivered_records(),
            failed = delivery.failed_records(),
            "Reporting finished"
        );

        Some(RunReport {
            run_id,
            public_url,
            delivery,
        })
    }

    /// Dispatches one host event. Returns the run report at run end.
    pub async fn handle(&mut self, event: &HostEvent) -> Option<RunReport> {
        match event {
            HostEvent::SuiteStart { name, source } => self.start_suite(name, source.as_deref()),
            HostEvent::TestStart(test) => self.start_test(test),
            HostEvent::TestEnd { test, outcome } => self.end_test(test, outcome),
            HostEvent::SuiteEnd { name } => self.end_suite(name),
            HostEvent::RunEnd => return self.close().await,
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, MockApi};
    use crate::report::Status;

    #[tokio::test]
    async fn test_disabled_listener_reports_nothing() {
        let mut listener = ReportListener::from_config(&Config::default()).unwrap();
        assert!(!listener.is_enabled());
        listener.end_test(&TestInfo::new("Test"), &TestOutcome::new(Status::Passed));
        assert!(listener.close().await.is_none());
    }

    #[tokio::test]
    async fn test_suite_end_flushes_partial_batch() {
        let api = Arc::new(MockApi::new());
        let mut listener = ReportListener::new(api.clone(), &Config::default(), RetryPolicy::immediate(2));

        listener.start_suite("Math", Some(Path::new("tests/math.robot")));
        listener.end_test(
            &TestInfo::new("Test Addition @T96c700e6"),
            &TestOutcome::new(Status::Passed),
        );
        listener.end_suite("Math");
        let report = listener.close().await.unwrap();

        assert_eq!(report.run_id.as_deref(), Some("run00001"));
        assert_eq!(report.delivery.delivered_records(), 1);
        let uploads = api.upload_attempts();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].tests[0].file.as_deref(), Some("math.robot"));
        assert_eq!(uploads[0].tests[0].suite_title.as_deref(), Some("Math"));
        assert_eq!(api.count(Endpoint::FinishRun), 1);
    }
}
