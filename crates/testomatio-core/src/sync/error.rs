use thiserror::Error;

use crate::api::TransportError;
use crate::codec::TestId;
use crate::config::ConfigError;
use crate::inventory::NodeRef;
use crate::source::RewriteError;

/// Two local tests claim the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Identifier {id} is claimed by both '{first}' and '{second}'")]
pub struct ReconciliationConflict {
    pub id: TestId,
    pub first: NodeRef,
    pub second: NodeRef,
}

/// Errors that abort a sync invocation. Source files are left untouched.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conflict(#[from] ReconciliationConflict),

    #[error("Sync request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to write identifiers to source: {0}")]
    Rewrite(#[from] RewriteError),
}
