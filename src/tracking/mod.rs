//! Tracking-service client boundary.
//!
//! The tracking service is the system of record for run state and logs. The
//! coordinator and runner only ever talk to it through [`TrackingClient`];
//! a ready-made REST implementation lives in [`http`].

pub mod http;

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::logging::LogEntry;
use crate::model::RunState;
use crate::staging::TableArtifact;

pub use http::HttpTrackingClient;

/// Remote tracking-service operations used by the run lifecycle.
///
/// Every call may fail with [`ConnectorError::Api`] carrying the HTTP status
/// when the service answered; the bad-request/not-found class is
/// unrecoverable, everything else is retried via message redelivery.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Report a state transition for the run.
    async fn patch_state(&self, run_name: &str, state: RunState) -> Result<(), ConnectorError>;

    /// Submit a batch of buffered log entries. Never called with an empty batch.
    async fn submit_log_batch(
        &self,
        run_name: &str,
        entries: &[LogEntry],
    ) -> Result<(), ConnectorError>;

    /// Close the run after its terminal state has been reported.
    async fn finish_run(&self, run_name: &str) -> Result<(), ConnectorError>;

    /// Trigger destination load jobs for the staged artifacts (tracked mode).
    async fn start_load(
        &self,
        run_name: &str,
        artifacts: &[TableArtifact],
    ) -> Result<(), ConnectorError>;

    /// Trigger destination load jobs directly against a dataset (untracked mode).
    async fn start_load_direct(
        &self,
        dataset_id: &str,
        artifacts: &[TableArtifact],
    ) -> Result<(), ConnectorError>;
}
