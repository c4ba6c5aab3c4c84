//! The import path: reconciliation and the sync request.

mod error;
mod plan;
mod reconciler;
mod transport;

pub use error::{ReconciliationConflict, SyncError};
pub use plan::{Change, PlanOp, ReconciliationPlan, Rule, SyncSummary};
pub use reconciler::{check_claims, reconcile};
pub use transport::{Rewrite, SyncOutcome, SyncTransport};
