use thiserror::Error;

use crate::api::TransportError;

/// Errors raised on the reporting path. None of them abort the host run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("No test run is available to report into")]
    SessionUnavailable,

    #[error("Delivery pipeline is closed")]
    PipelineClosed,
}
