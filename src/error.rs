//! Error types crossing the transfer-run lifecycle boundary.
//!
//! Everything that escapes a run scope is a [`ConnectorError`]. The variant
//! decides the fate of the trigger message, but that decision is made only in
//! the trigger loop — the coordinator itself only decides SUCCEEDED/FAILED
//! and whether the error is suppressed.

use std::time::Duration;
use thiserror::Error;

/// Remote-API status codes that are never worth retrying.
///
/// A tracking-service call rejected with one of these will be rejected again
/// on every redelivery, so the trigger loop consumes the message instead of
/// looping forever against a permanently-rejecting API.
const UNRECOVERABLE_API_STATUSES: [u16; 2] = [400, 404];

/// Classified error for a transfer run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Run parameters failed a precondition check. Suppressed at scope exit:
    /// the run is reported FAILED but the error does not escape the scope.
    #[error("invalid transfer run parameters: {0}")]
    Validation(String),

    /// A tracking-service call failed. `status` is the HTTP status when the
    /// service answered; transport failures carry no status and are treated
    /// as recoverable.
    #[error("tracking service error{}: {message}", fmt_status(.status))]
    Api { status: Option<u16>, message: String },

    /// The run body did not finish within the configured wall-clock timeout.
    #[error("transfer run timed out after {timeout:?}")]
    DeadlineExceeded { timeout: Duration },

    /// Anything else: staging failures, upload failures, decode errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl ConnectorError {
    /// True for remote-API errors in the bad-request/not-found class.
    pub fn is_unrecoverable_api(&self) -> bool {
        matches!(self, ConnectorError::Api { status: Some(code), .. }
            if UNRECOVERABLE_API_STATUSES.contains(code))
    }

    /// True for every other remote-API failure, including transport errors.
    pub fn is_recoverable_api(&self) -> bool {
        matches!(self, ConnectorError::Api { .. }) && !self.is_unrecoverable_api()
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectorError::Validation(_) => "validation_failure",
            ConnectorError::Api { .. } if self.is_unrecoverable_api() => "api_unrecoverable",
            ConnectorError::Api { .. } => "api_recoverable",
            ConnectorError::DeadlineExceeded { .. } => "deadline_exceeded",
            ConnectorError::Other(_) => "unclassified",
        }
    }
}
