//! The reporting path: result records, batching, the run session and the
//! delivery pipeline.

mod error;
mod pipeline;
mod queue;
mod record;
mod session;

pub use error::ReportError;
pub use pipeline::{BatchOutcome, BatchState, DeliveryPipeline, DeliveryReport};
pub use queue::{Batch, ResultQueue};
pub use record::{ResultRecord, Status};
pub use session::{RunSession, SessionState};
