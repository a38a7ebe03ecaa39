//! Transfer-run data model: descriptors, run state, parameter normalization.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectorError;

/// Reported state of a transfer run.
///
/// Exactly one forward transition happens per run: `Running` is reported at
/// scope entry, and exactly one of `Succeeded`/`Failed` at scope exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "RUNNING",
            RunState::Succeeded => "SUCCEEDED",
            RunState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transfer run, as delivered by a trigger message or run file.
///
/// Immutable after [`RunDescriptor::normalize_integer_params`] has run; the
/// name components are decomposed once at construction time.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    /// Full resource path, `projects/{p}/locations/{l}/transferConfigs/{c}/runs/{r}`.
    pub name: String,
    pub project_id: String,
    pub location_id: String,
    pub config_id: String,
    pub run_id: String,
    pub data_source_id: String,
    pub run_time: DateTime<Utc>,
    pub user_id: String,
    /// Connector-specific parameters from the transfer config.
    pub params: Map<String, Value>,
    /// Target dataset for direct (non-tracked) loads.
    pub destination_dataset_id: Option<String>,
}

/// Wire form of a run descriptor (queue payload JSON, run-file YAML).
#[derive(Debug, Deserialize)]
struct RawRunDescriptor {
    name: String,
    data_source_id: String,
    run_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "string_or_number")]
    user_id: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    destination_dataset_id: Option<String>,
}

/// Accepts either a JSON/YAML string or an integer for fields that some
/// producers emit as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl RunDescriptor {
    /// Decode a descriptor from a queue message payload (JSON).
    pub fn from_json_bytes(payload: &[u8]) -> Result<Self> {
        let raw: RawRunDescriptor =
            serde_json::from_slice(payload).context("failed to decode transfer run payload")?;
        Self::from_raw(raw)
    }

    /// Decode a descriptor from a run file (YAML).
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawRunDescriptor =
            serde_yaml::from_str(text).context("failed to decode transfer run file")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRunDescriptor) -> Result<Self> {
        let (project_id, location_id, config_id, run_id) = parse_run_name(&raw.name)?;
        Ok(Self {
            name: raw.name,
            project_id,
            location_id,
            config_id,
            run_id,
            data_source_id: raw.data_source_id,
            run_time: raw.run_time,
            user_id: raw.user_id,
            params: raw.params,
            destination_dataset_id: raw.destination_dataset_id,
        })
    }

    /// Coerce declared integer params that arrived as strings into numbers.
    ///
    /// Trigger payloads carry all params as strings; connectors declare which
    /// of them are integers. A declared integer that does not parse is a
    /// validation failure.
    pub fn normalize_integer_params(
        &mut self,
        integer_params: &[&str],
    ) -> Result<(), ConnectorError> {
        for key in integer_params {
            let Some(value) = self.params.get_mut(*key) else {
                continue;
            };
            if let Value::String(s) = value {
                let parsed: i64 = s.parse().map_err(|_| {
                    ConnectorError::Validation(format!(
                        "param '{key}' must be an integer, got '{s}'"
                    ))
                })?;
                *value = Value::Number(parsed.into());
            }
        }
        Ok(())
    }

    /// Check that every required param is present.
    pub fn check_required_params(&self, required: &[&str]) -> Result<(), ConnectorError> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|key| !self.params.contains_key(**key))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::Validation(format!(
                "missing required params: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Split a transfer run resource path into its four id components.
pub fn parse_run_name(name: &str) -> Result<(String, String, String, String)> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "locations", location, "transferConfigs", config, "runs", run]
            if !project.is_empty() && !location.is_empty() && !config.is_empty() && !run.is_empty() =>
        {
            Ok((
                project.to_string(),
                location.to_string(),
                config.to_string(),
                run.to_string(),
            ))
        }
        _ => Err(anyhow!(
            "invalid transfer run name '{name}', expected \
             projects/{{p}}/locations/{{l}}/transferConfigs/{{c}}/runs/{{r}}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_NAME: &str =
        "projects/partner-project/locations/us/transferConfigs/cfg-1/runs/run-1";

    #[test]
    fn test_parse_run_name() {
        let (project, location, config, run) = parse_run_name(RUN_NAME).unwrap();
        assert_eq!(project, "partner-project");
        assert_eq!(location, "us");
        assert_eq!(config, "cfg-1");
        assert_eq!(run, "run-1");
    }

    #[test]
    fn test_parse_run_name_rejects_malformed() {
        assert!(parse_run_name("projects/p/locations/l").is_err());
        assert!(parse_run_name("projects//locations/l/transferConfigs/c/runs/r").is_err());
        assert!(parse_run_name("foo/p/locations/l/transferConfigs/c/runs/r").is_err());
        assert!(parse_run_name("").is_err());
    }

    #[test]
    fn test_decode_json_payload() {
        let payload = format!(
            r#"{{"name": "{RUN_NAME}", "data_source_id": "ds1",
                "run_time": "2026-08-01T00:00:00Z", "user_id": 42,
                "params": {{"customer_id": "7"}}}}"#
        );
        let descriptor = RunDescriptor::from_json_bytes(payload.as_bytes()).unwrap();
        assert_eq!(descriptor.config_id, "cfg-1");
        assert_eq!(descriptor.run_id, "run-1");
        assert_eq!(descriptor.user_id, "42");
        assert_eq!(descriptor.params["customer_id"], "7");
        assert!(descriptor.destination_dataset_id.is_none());
    }

    #[test]
    fn test_decode_yaml_run_file() {
        let text = format!(
            "name: {RUN_NAME}\n\
             data_source_id: ds1\n\
             run_time: 2026-08-01T00:00:00Z\n\
             user_id: partner-user\n\
             destination_dataset_id: reporting\n\
             params:\n  region: eu\n"
        );
        let descriptor = RunDescriptor::from_yaml(&text).unwrap();
        assert_eq!(descriptor.data_source_id, "ds1");
        assert_eq!(descriptor.destination_dataset_id.as_deref(), Some("reporting"));
        assert_eq!(descriptor.params["region"], "eu");
    }

    #[test]
    fn test_normalize_integer_params() {
        let payload = format!(
            r#"{{"name": "{RUN_NAME}", "data_source_id": "ds1",
                "run_time": "2026-08-01T00:00:00Z",
                "params": {{"lookback_days": "30", "label": "prod", "limit": 5}}}}"#
        );
        let mut descriptor = RunDescriptor::from_json_bytes(payload.as_bytes()).unwrap();
        descriptor
            .normalize_integer_params(&["lookback_days", "limit", "absent"])
            .unwrap();
        assert_eq!(descriptor.params["lookback_days"], 30);
        assert_eq!(descriptor.params["limit"], 5);
        assert_eq!(descriptor.params["label"], "prod");
    }

    #[test]
    fn test_normalize_rejects_non_integer() {
        let payload = format!(
            r#"{{"name": "{RUN_NAME}", "data_source_id": "ds1",
                "run_time": "2026-08-01T00:00:00Z",
                "params": {{"lookback_days": "thirty"}}}}"#
        );
        let mut descriptor = RunDescriptor::from_json_bytes(payload.as_bytes()).unwrap();
        let err = descriptor
            .normalize_integer_params(&["lookback_days"])
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Validation(_)));
    }

    #[test]
    fn test_check_required_params() {
        let payload = format!(
            r#"{{"name": "{RUN_NAME}", "data_source_id": "ds1",
                "run_time": "2026-08-01T00:00:00Z", "params": {{"a": 1}}}}"#
        );
        let descriptor = RunDescriptor::from_json_bytes(payload.as_bytes()).unwrap();
        assert!(descriptor.check_required_params(&["a"]).is_ok());
        let err = descriptor.check_required_params(&["a", "b"]).unwrap_err();
        assert!(matches!(err, ConnectorError::Validation(ref m) if m.contains("b")));
    }

    #[test]
    fn test_run_state_wire_form() {
        assert_eq!(serde_json::to_string(&RunState::Running).unwrap(), "\"RUNNING\"");
        assert_eq!(RunState::Failed.to_string(), "FAILED");
    }
}
