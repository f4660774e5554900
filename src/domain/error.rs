// Chart data errors
// None of these are fatal to a chart: they are surfaced in render state and
// the affected range stays eligible for retry.
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChartError {
    /// Transport failure, bad status, undecodable body, abort or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The response lacks an expected series path.
    #[error("Malformed response: missing data for path '{0}'")]
    MalformedResponse(String),

    /// The change notification channel could not be attached or was lost.
    #[error("Subscription error: {0}")]
    Subscription(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NetworkError,
    MalformedResponse,
    SubscriptionError,
}

impl ChartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChartError::Network(_) => ErrorKind::NetworkError,
            ChartError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ChartError::Subscription(_) => ErrorKind::SubscriptionError,
        }
    }
}

/// Error as shown to the UI (icon plus hover text).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ChartError> for ErrorReport {
    fn from(error: &ChartError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
