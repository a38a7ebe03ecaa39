//! Configuration for the connector runtime.
//!
//! This module centralizes the tunable defaults and the table-config file
//! format describing destination tables and their schemas.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Lifecycle defaults
// ============================================================================

/// Wall-clock budget for one transfer run before the timeout timer aborts it.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Interval between heartbeat flushes to the tracking service.
///
/// Must stay at or below the tracking service's update deadline, otherwise
/// the service declares the run stalled between two heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60); // 1 minute

/// Queue messages processed concurrently unless overridden.
pub const DEFAULT_MAX_MESSAGES: usize = 1;

// ============================================================================
// Table-config file
// ============================================================================

/// Map of schema key to destination-table configuration, loaded from YAML.
pub type TableConfigMap = BTreeMap<String, TableConfig>;

/// Destination configuration for one staged table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Template for the destination table id; `{placeholder}` tokens are
    /// substituted from run params plus `run_time`, `run_yyyymmdd`, `user_id`.
    pub destination_table_id_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table_description: Option<String>,
    pub table_defs: Vec<TableDef>,
}

/// Source-format definition for one set of staged files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub format: String,
    #[serde(default)]
    pub max_bad_records: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub schema: RecordSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSchema {
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_repeated: bool,
}

/// Load the table-config map from a YAML file.
pub fn load_table_config(path: &Path) -> Result<TableConfigMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read table config {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse table config {}", path.display()))
}
