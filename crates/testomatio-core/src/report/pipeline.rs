//! Background delivery of result batches.
//!
//! The caller side ([`DeliveryPipeline`]) only queues records and hands
//! formed batches to a worker task over an unbounded channel, so enqueueing
//! never waits on the network. The worker sends one batch at a time, in
//! formation order, and moves to the next only once the current one is
//! delivered or failed.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::error::ReportError;
use super::queue::{Batch, ResultQueue};
use super::record::ResultRecord;
use super::session::RunSession;
use crate::api::{BatchRequest, SharedApi, TransportError};
use crate::retry::{RetryPolicy, RetryableError};

/// Per-batch delivery state.
///
/// `Pending -> Sending -> {Delivered | Retrying | Failed}`, with
/// `Retrying -> Sending` after the pacing delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Sending,
    Retrying,
    Delivered,
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Delivered | BatchState::Failed)
    }
}

/// Terminal result of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub index: u64,
    pub records: usize,
    pub attempts: u32,
    pub state: BatchState,
    pub error: Option<String>,
}

/// Summary of everything the pipeline sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub batches: Vec<BatchOutcome>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| b.state == BatchState::Delivered)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| b.state == BatchState::Failed)
    }

    pub fn delivered_records(&self) -> usize {
        self.delivered().map(|b| b.records).sum()
    }

    pub fn failed_records(&self) -> usize {
        self.failed().map(|b| b.records).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

enum Command {
    Open,
    Deliver(Batch),
}

/// Handle used by the reporting listener.
pub struct DeliveryPipeline {
    queue: ResultQueue,
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<(RunSession, DeliveryReport)>,
    opened: bool,
}

impl DeliveryPipeline {
    /// Starts the worker task. Must be called inside a Tokio runtime.
    pub fn spawn(
        api: SharedApi,
        session: RunSession,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            api,
            session,
            policy,
            report: DeliveryReport::default(),
        };

        Self {
            queue: ResultQueue::new(batch_size),
            tx,
            worker: tokio::spawn(worker.run(rx)),
            opened: false,
        }
    }

    /// Asks the worker to create the run ahead of the first batch.
    pub fn open(&mut self) -> Result<(), ReportError> {
        if self.opened {
            return Ok(());
        }
        self.opened = true;
        self.send(Command::Open)
    }

    /// Queues a record and dispatches any batch that became full.
    pub fn submit(&mut self, record: ResultRecord) -> Result<(), ReportError> {
        self.open()?;
        self.queue.enqueue(record);
        for batch in self.queue.drain_full() {
            self.send(Command::Deliver(batch))?;
        }
        Ok(())
    }

    /// Dispatches everything queued, including a partial batch.
    pub fn flush(&mut self) -> Result<(), ReportError> {
        for batch in self.queue.drain_all() {
            self.send(Command::Deliver(batch))?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Flushes the queue and waits until every dispatched batch reached a
    /// terminal state. Returns the session for finalization.
    pub async fn shutdown(mut self) -> Result<(RunSession, DeliveryReport), ReportError> {
        self.flush()?;
        drop(self.tx);

        let (session, report) = self.worker.await.map_err(|e| {
            error!(error = %e, "Delivery worker stopped unexpectedly");
            ReportError::PipelineClosed
        })?;

        if !report.is_complete() {
            let batches: Vec<u64> = report.failed().map(|b| b.index).collect();
            error!(
                failed_batches = ?batches,
                lost_results = report.failed_records(),
                "Some results could not be delivered"
            );
        }
        Ok((session, report))
    }

    fn send(&self, command: Command) -> Result<(), ReportError> {
        self.tx.send(command).map_err(|_| ReportError::PipelineClosed)
    }
}

struct Worker {
    api: SharedApi,
    session: RunSession,
    policy: RetryPolicy,
    report: DeliveryReport,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) -> (RunSession, DeliveryReport) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Open => {
                    // Failure is recorded in the session state and surfaces
                    // on the first batch.
                    let _ = self.session.ensure_session().await;
                }
                Command::Deliver(batch) => {
                    let outcome = self.deliver(batch).await;
                    self.report.batches.push(outcome);
                }
            }
        }
        (self.session, self.report)
    }

    async fn deliver(&mut self, batch: Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            index: batch.index,
            records: batch.len(),
            attempts: 0,
            state: BatchState::Pending,
            error: None,
        };

        let run_id = match self.session.ensure_session().await {
            Ok(run_id) => run_id,
            Err(err) => {
                warn!(batch = batch.index, records = batch.len(), error = %err, "Batch dropped");
                outcome.state = BatchState::Failed;
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let request = BatchRequest {
            tests: batch.records.iter().map(ResultRecord::to_wire).collect(),
            batch_index: batch.index,
        };
        let max_attempts = self.policy.max_attempts();

        while !outcome.state.is_terminal() {
            outcome.state = BatchState::Sending;
            outcome.attempts += 1;
            debug!(run = %run_id, batch = batch.index, attempt = outcome.attempts, "Uploading batch");

            outcome.state = match self.api.upload_batch(&run_id, &request).await {
                Ok(()) => BatchState::Delivered,
                Err(err) => self.on_failure(&mut outcome, err, max_attempts),
            };

            if outcome.state == BatchState::Retrying {
                sleep(self.policy.backoff_delay(outcome.attempts)).await;
            }
        }

        match outcome.state {
            BatchState::Delivered => info!(
                run = %run_id,
                batch = batch.index,
                records = outcome.records,
                attempts = outcome.attempts,
                "Batch delivered"
            ),
            _ => warn!(
                run = %run_id,
                batch = batch.index,
                records = outcome.records,
                attempts = outcome.attempts,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Batch failed"
            ),
        }
        outcome
    }

    fn on_failure(
        &self,
        outcome: &mut BatchOutcome,
        err: TransportError,
        max_attempts: u32,
    ) -> BatchState {
        let retry = err.is_retryable() && outcome.attempts < max_attempts;
        if retry {
            warn!(
                batch = outcome.index,
                attempt = outcome.attempts,
                max_attempts,
                delay_secs = self.policy.backoff_delay(outcome.attempts).as_secs_f64(),
                error = %err,
                "Batch upload failed, retrying"
            );
        }
        outcome.error = Some(err.to_string());
        if retry {
            BatchState::Retrying
        } else {
            BatchState::Failed
        }
    }
}
