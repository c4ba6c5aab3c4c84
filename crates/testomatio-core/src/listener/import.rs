use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::TestDirective;
use crate::api::{HttpClient, SharedApi};
use crate::config::{Config, ConfigError, ImportOptions};
use crate::event::{HostEvent, TestInfo};
use crate::inventory::{InventoryBuilder, TestMeta};
use crate::source::{RobotFileRewriter, SourceRewriter};
use crate::sync::{SyncError, SyncOutcome, SyncTransport};

/// Collects the discovered tests during an import-only run and syncs them
/// with the project at run end.
pub struct ImportListener {
    transport: Option<SyncTransport>,
    rewriter: Arc<dyn SourceRewriter>,
    options: ImportOptions,
    builder: InventoryBuilder,
    sources: Vec<Option<PathBuf>>,
    closed: bool,
}

impl ImportListener {
    pub fn new(
        api: SharedApi,
        rewriter: Arc<dyn SourceRewriter>,
        options: ImportOptions,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let transport = SyncTransport::new(api, rewriter.clone(), options, config.import.clone());
        Ok(Self::with_transport(Some(transport), rewriter, options))
    }

    /// Builds a listener talking to the configured service.
    ///
    /// Without an API key the listener is disabled and every callback is a
    /// no-op.
    pub fn from_config(config: &Config, options: ImportOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        match HttpClient::from_config(&config.api) {
            Ok(client) => Self::new(Arc::new(client), Arc::new(RobotFileRewriter), options, config),
            Err(ConfigError::MissingApiKey) => {
                warn!("{}", ConfigError::MissingApiKey);
                Ok(Self::disabled())
            }
            Err(e) => Err(e),
        }
    }

    pub fn disabled() -> Self {
        Self::with_transport(None, Arc::new(RobotFileRewriter), ImportOptions::default())
    }

    fn with_transport(
        transport: Option<SyncTransport>,
        rewriter: Arc<dyn SourceRewriter>,
        options: ImportOptions,
    ) -> Self {
        Self {
            transport,
            rewriter,
            options,
            builder: InventoryBuilder::new(),
            sources: Vec::new(),
            closed: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Tests collected so far.
    pub fn collected(&self) -> usize {
        self.builder.len()
    }

    pub fn start_suite(&mut self, name: &str, source: Option<&Path>) {
        self.sources.push(source.map(Path::to_path_buf));
        if !self.is_enabled() {
            return;
        }

        if self.options.remove_ids {
            if let Some(file) = source.filter(|s| s.is_file()) {
                if let Err(e) = self.rewriter.strip_ids(file) {
                    warn!(file = %file.display(), error = %e, "Failed to remove identifiers");
                }
            }
            return;
        }
        self.builder.start_suite(name, source.map(Path::to_path_buf));
    }

    /// Test bodies are never executed during an import.
    pub fn start_test(&mut self, _test: &TestInfo) -> TestDirective {
        TestDirective::Skip {
            reason: "Import only",
        }
    }

    pub fn end_test(&mut self, test: &TestInfo) {
        if !self.is_enabled() || self.options.remove_ids {
            return;
        }

        let file = test
            .source
            .clone()
            .or_else(|| self.sources.iter().rev().flatten().next().cloned())
            .unwrap_or_default();
        let code = match self.rewriter.test_code(&file, &test.name) {
            Ok(code) => code,
            Err(e) => {
                debug!(test = %test.name, error = %e, "Test source unavailable");
                None
            }
        };

        self.builder.add_test(TestMeta {
            name: test.name.clone(),
            file,
            tags: test.tags.clone(),
            code,
        });
    }

    pub fn end_suite(&mut self, name: &str) {
        self.sources.pop();
        if self.is_enabled() && !self.options.remove_ids {
            self.builder.end_suite(name);
        }
    }

    /// Syncs the collected tests. Only the first call does any work.
    pub async fn close(&mut self) -> Result<Option<SyncOutcome>, SyncError> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;

        let Some(transport) = &self.transport else {
            return Ok(None);
        };
        if self.options.remove_ids {
            info!("Identifiers removed, skipping import");
            return Ok(None);
        }

        let inventory = std::mem::take(&mut self.builder).finish();
        transport.sync(&inventory).await.map(Some)
    }

    /// Dispatches one host event. Returns the sync outcome at run end.
    pub async fn handle(&mut self, event: &HostEvent) -> Result<Option<SyncOutcome>, SyncError> {
        match event {
            HostEvent::SuiteStart { name, source } => self.start_suite(name, source.as_deref()),
            HostEvent::TestStart(test) => {
                let directive = self.start_test(test);
                debug!(test = %test.name, ?directive, "Test start");
            }
            HostEvent::TestEnd { test, .. } => self.end_test(test),
            HostEvent::SuiteEnd { name } => self.end_suite(name),
            HostEvent::RunEnd => return self.close().await,
        }
        Ok(None)
    }
}
