//! Destination-table naming: template rendering and the staging wrapper.

use std::future::Future;

use serde_json::Value;

use super::TableArtifact;
use crate::config::TableConfigMap;
use crate::coordination::RunContext;
use crate::error::ConnectorError;
use crate::model::RunDescriptor;

/// Render a destination-table template against a run descriptor.
///
/// `{placeholder}` tokens are substituted from the run params plus the
/// built-ins `run_time` (RFC 3339), `run_yyyymmdd`, and `user_id`. `{{` and
/// `}}` are literal braces; everything else, `$` included, passes through
/// (partition decorators like `table${run_yyyymmdd}` come out as
/// `table$20260801`). Unknown placeholders and unbalanced braces are
/// validation failures.
pub fn render_table_name(
    template: &str,
    descriptor: &RunDescriptor,
) -> Result<String, ConnectorError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => key.push(c),
                        None => {
                            return Err(ConnectorError::Validation(format!(
                                "unbalanced brace in table template '{template}'"
                            )));
                        }
                    }
                }
                out.push_str(&lookup_placeholder(&key, descriptor)?);
            }
            '}' => {
                return Err(ConnectorError::Validation(format!(
                    "unbalanced brace in table template '{template}'"
                )));
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn lookup_placeholder(key: &str, descriptor: &RunDescriptor) -> Result<String, ConnectorError> {
    match key {
        "run_time" => return Ok(descriptor.run_time.to_rfc3339()),
        "run_yyyymmdd" => return Ok(descriptor.run_time.format("%Y%m%d").to_string()),
        "user_id" => return Ok(descriptor.user_id.clone()),
        _ => {}
    }

    match descriptor.params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(ConnectorError::Validation(format!(
            "param '{key}' is not substitutable in a table name: {other}"
        ))),
        None => Err(ConnectorError::Validation(format!(
            "unknown placeholder '{{{key}}}' in table template"
        ))),
    }
}

/// Wraps a staging function with destination naming for one configured table.
///
/// The explicit composition replacing boilerplate around per-table staging:
/// look up the table config by schema key, render its destination name from
/// the run, invoke the staging closure for the file locations, and assemble
/// the finished [`TableArtifact`].
#[derive(Debug)]
pub struct TableStager {
    schema_key: String,
    template: String,
}

impl TableStager {
    pub fn from_config(config: &TableConfigMap, schema_key: &str) -> Result<Self, ConnectorError> {
        let table = config.get(schema_key).ok_or_else(|| {
            ConnectorError::Validation(format!("unknown table config key '{schema_key}'"))
        })?;
        Ok(Self {
            schema_key: schema_key.to_string(),
            template: table.destination_table_id_template.clone(),
        })
    }

    pub fn schema_key(&self) -> &str {
        &self.schema_key
    }

    /// Run `stage_fn` and wrap its file locations into a named artifact.
    pub async fn stage<F, Fut>(
        &self,
        ctx: &RunContext,
        stage_fn: F,
    ) -> Result<TableArtifact, ConnectorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, ConnectorError>>,
    {
        let destination_name = render_table_name(&self.template, &ctx.descriptor)?;
        let source_locations = stage_fn().await?;
        Ok(TableArtifact {
            schema_key: self.schema_key.clone(),
            destination_name,
            source_locations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> RunDescriptor {
        RunDescriptor::from_yaml(
            "name: projects/p/locations/us/transferConfigs/c/runs/r\n\
             data_source_id: ds1\n\
             run_time: 2026-08-01T12:30:00Z\n\
             user_id: u-99\n\
             params:\n  customer_id: acme\n  shard: 7\n",
        )
        .unwrap()
    }

    #[test]
    fn test_render_params_and_builtins() {
        let descriptor = descriptor();
        assert_eq!(
            render_table_name("orders_{customer_id}_{shard}", &descriptor).unwrap(),
            "orders_acme_7"
        );
        assert_eq!(
            render_table_name("t${run_yyyymmdd}", &descriptor).unwrap(),
            "t$20260801"
        );
        assert_eq!(
            render_table_name("audit_{user_id}", &descriptor).unwrap(),
            "audit_u-99"
        );
    }

    #[test]
    fn test_render_literal_braces() {
        let descriptor = descriptor();
        assert_eq!(
            render_table_name("raw_{{not_a_param}}", &descriptor).unwrap(),
            "raw_{not_a_param}"
        );
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let err = render_table_name("t_{nope}", &descriptor()).unwrap_err();
        assert!(matches!(err, ConnectorError::Validation(ref m) if m.contains("nope")));
    }

    #[test]
    fn test_render_rejects_unbalanced_braces() {
        assert!(render_table_name("t_{customer_id", &descriptor()).is_err());
        assert!(render_table_name("t_}", &descriptor()).is_err());
    }

    #[test]
    fn test_table_stager_unknown_key() {
        let config = TableConfigMap::new();
        let err = TableStager::from_config(&config, "missing").unwrap_err();
        assert!(matches!(err, ConnectorError::Validation(_)));
    }
}
