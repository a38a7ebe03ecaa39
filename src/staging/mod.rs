//! Data staging: the connector-supplied local stage step and the upload step
//! that rewrites artifacts with their remote locations.

pub mod destination;
pub mod fs_uploader;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordination::RunContext;
use crate::error::ConnectorError;

pub use destination::{TableStager, render_table_name};
pub use fs_uploader::FsUploader;

/// One staged table: which schema it uses, where it loads to, and where its
/// files live (local paths after staging, remote locations after upload).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableArtifact {
    pub schema_key: String,
    #[serde(rename = "destinationTableId")]
    pub destination_name: String,
    #[serde(rename = "sourceUris")]
    pub source_locations: Vec<String>,
}

/// A data-source connector.
///
/// Implementations stage each table's data into files under `local_prefix`
/// and describe the result as [`TableArtifact`]s; the runtime takes care of
/// everything else (lifecycle, upload, load trigger, message settlement).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Params that must be present on every run descriptor.
    fn required_params(&self) -> &[&str] {
        &[]
    }

    /// Params delivered as strings that must be coerced to integers.
    fn integer_params(&self) -> &[&str] {
        &[]
    }

    async fn stage_tables_locally(
        &self,
        ctx: &RunContext,
        local_prefix: &Path,
    ) -> Result<Vec<TableArtifact>, ConnectorError>;
}

/// Copies staged local files to their remote location.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `locations` (local paths produced under `local_prefix`) below
    /// `remote_prefix`, returning the remote locations in the same order.
    async fn upload(
        &self,
        locations: &[String],
        local_prefix: &Path,
        remote_prefix: &str,
    ) -> Result<Vec<String>>;
}

/// Stage tables locally, then upload each artifact's files.
///
/// Local files land under `{local_root}/{data_source_id}/{config_id}`, remote
/// files under `{remote_root}/{data_source_id}/{config_id}`, so concurrent
/// runs of different configs never collide.
pub async fn stage_for_run(
    connector: &dyn Connector,
    uploader: &dyn Uploader,
    ctx: &RunContext,
    local_root: &Path,
    remote_root: &str,
) -> Result<Vec<TableArtifact>, ConnectorError> {
    let descriptor = &ctx.descriptor;
    let local_prefix: PathBuf = local_root
        .join(&descriptor.data_source_id)
        .join(&descriptor.config_id);
    tokio::fs::create_dir_all(&local_prefix)
        .await
        .map_err(|err| anyhow::anyhow!("failed to create staging dir: {err}"))?;

    ctx.logger
        .info(format!("staging local => {}", local_prefix.display()));
    let local_artifacts = connector.stage_tables_locally(ctx, &local_prefix).await?;

    let remote_prefix = format!(
        "{}/{}/{}",
        remote_root.trim_end_matches('/'),
        descriptor.data_source_id,
        descriptor.config_id
    );
    ctx.logger
        .info(format!("staging remote => {remote_prefix}"));

    let mut remote_artifacts = Vec::with_capacity(local_artifacts.len());
    for artifact in local_artifacts {
        ctx.logger
            .info(format!("staging remote table => {}", artifact.destination_name));
        let remote_locations = uploader
            .upload(&artifact.source_locations, &local_prefix, &remote_prefix)
            .await?;
        remote_artifacts.push(TableArtifact {
            schema_key: artifact.schema_key,
            destination_name: artifact.destination_name,
            source_locations: remote_locations,
        });
    }

    Ok(remote_artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_wire_form() {
        let artifact = TableArtifact {
            schema_key: "date_greg".to_string(),
            destination_name: "date_greg$20260801".to_string(),
            source_locations: vec!["gs://bucket/a.json".to_string()],
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["schemaKey"], "date_greg");
        assert_eq!(json["destinationTableId"], "date_greg$20260801");
        assert_eq!(json["sourceUris"][0], "gs://bucket/a.json");
    }
}
