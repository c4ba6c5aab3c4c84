use thiserror::Error;

use crate::retry::RetryableError;

/// Message logged when the service rejects the project token.
pub const FORBIDDEN_MESSAGE: &str =
    "Authentication failed. Please check your Testomatio project token. It may be invalid or expired";

/// Errors that can occur while talking to the Testomat.io service.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service returned error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("{}", FORBIDDEN_MESSAGE)]
    Forbidden,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Builds the error for a non-2xx status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => TransportError::Forbidden,
            _ => TransportError::Status {
                status,
                message: message.into(),
            },
        }
    }
}

impl RetryableError for TransportError {
    /// Timeouts, connection failures and non-2xx responses count as failed
    /// attempts. A rejected token or an undecodable body will not improve on
    /// a second try.
    fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Forbidden | TransportError::Decode(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_statuses() {
        assert!(matches!(TransportError::from_status(401, ""), TransportError::Forbidden));
        assert!(matches!(TransportError::from_status(403, ""), TransportError::Forbidden));
        assert!(matches!(
            TransportError::from_status(502, "bad gateway"),
            TransportError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Network("reset".into()).is_retryable());
        assert!(TransportError::from_status(500, "").is_retryable());
        assert!(TransportError::from_status(404, "").is_retryable());
        assert!(!TransportError::Forbidden.is_retryable());
        assert!(!TransportError::Decode("eof".into()).is_retryable());
    }
}
