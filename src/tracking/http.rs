//! REST implementation of [`TrackingClient`].

use async_trait::async_trait;
use serde_json::json;

use super::TrackingClient;
use crate::error::ConnectorError;
use crate::logging::LogEntry;
use crate::model::RunState;
use crate::staging::TableArtifact;

/// Tracking-service client speaking JSON over HTTP.
///
/// Resource paths mirror the run name, e.g.
/// `{base}/v1/projects/p/locations/l/transferConfigs/c/runs/r:finishRun`.
pub struct HttpTrackingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTrackingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(), ConnectorError> {
        let response = request.send().await.map_err(|err| ConnectorError::Api {
            status: None,
            message: format!("transport error: {err}"),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(ConnectorError::Api {
            status: Some(status.as_u16()),
            message,
        })
    }
}

#[async_trait]
impl TrackingClient for HttpTrackingClient {
    async fn patch_state(&self, run_name: &str, state: RunState) -> Result<(), ConnectorError> {
        let request = self
            .client
            .patch(self.url(run_name))
            .query(&[("updateMask", "state")])
            .json(&json!({ "state": state }));
        self.send(request).await
    }

    async fn submit_log_batch(
        &self,
        run_name: &str,
        entries: &[LogEntry],
    ) -> Result<(), ConnectorError> {
        let request = self
            .client
            .post(self.url(&format!("{run_name}/logMessages")))
            .json(&json!({ "transferMessages": entries }));
        self.send(request).await
    }

    async fn finish_run(&self, run_name: &str) -> Result<(), ConnectorError> {
        let request = self.client.post(self.url(&format!("{run_name}:finishRun")));
        self.send(request).await
    }

    async fn start_load(
        &self,
        run_name: &str,
        artifacts: &[TableArtifact],
    ) -> Result<(), ConnectorError> {
        let request = self
            .client
            .post(self.url(&format!("{run_name}:startLoadJobs")))
            .json(&json!({ "importedData": artifacts }));
        self.send(request).await
    }

    async fn start_load_direct(
        &self,
        dataset_id: &str,
        artifacts: &[TableArtifact],
    ) -> Result<(), ConnectorError> {
        let request = self
            .client
            .post(self.url(&format!("datasets/{dataset_id}/loadJobs")))
            .json(&json!({ "importedData": artifacts }));
        self.send(request).await
    }
}
