//! `postgres-sql` reference tool kind: binds parameters positionally
//! (`$1`, `$2`, ...) into a statement against a `postgres-sql` source,
//! never interpolating client values into statement text (§4.6).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{Column, PgPool, Row};

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::param::{substitute_template, ParamValues, Parameter, TemplateParameter};
use crate::source::{PostgresSource, Source};

use super::{manifest_from_parameters, mcp_manifest_from_parameters, validate_auth_mutual_exclusion, Manifest, McpManifest, Tool, ToolConfig};

/// Catalog shape for a `postgres-sql` tool document.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct SqlToolConfig {
    /// Name of the `postgres-sql` source to bind to.
    pub source: String,
    /// Human-readable description, surfaced in manifests.
    #[serde(default)]
    pub description: String,
    /// Declared parameters, bound positionally in this order.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Template parameters, spliced into `statement` before preparation.
    #[serde(rename = "templateParameters", default)]
    pub template_parameters: Vec<TemplateParameter>,
    /// Auth service names, any one of which authorizes invocation.
    #[serde(rename = "authRequired", default)]
    pub auth_required: Vec<String>,
    /// SQL statement text, using `$1`, `$2`, ... in parameter declaration
    /// order and `{{.name}}` placeholders for template parameters.
    pub statement: String,
}

impl SqlToolConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_auth_mutual_exclusion(&self.auth_required, &self.parameters)
    }
}

#[async_trait]
impl ToolConfig for SqlToolConfig {
    fn kind(&self) -> &'static str {
        "postgres-sql"
    }

    fn source_name(&self) -> &str {
        &self.source
    }

    fn summary(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn validate(&self) -> Result<()> {
        SqlToolConfig::validate(self)
    }

    async fn initialize(&self, name: &str, source: Arc<dyn Source>) -> Result<Arc<dyn Tool>> {
        if source.kind() != "postgres-sql" {
            return Err(Error::Config(format!(
                "tool `{name}` requires a `postgres-sql` source, got `{}`",
                source.kind()
            )));
        }
        let pool = source
            .as_any()
            .downcast_ref::<PostgresSource>()
            .ok_or_else(|| Error::Internal("postgres-sql source downcast failed".into()))?
            .pool()
            .clone();

        let manifest = manifest_from_parameters(name, &self.description, &self.parameters, &self.auth_required);
        let mcp_manifest = mcp_manifest_from_parameters(name, &self.description, &self.parameters);

        Ok(Arc::new(SqlTool {
            name: name.to_string(),
            source,
            pool,
            parameters: self.parameters.clone(),
            template_parameters: self.template_parameters.clone(),
            auth_required: self.auth_required.clone(),
            statement: self.statement.clone(),
            manifest,
            mcp_manifest,
        }))
    }
}

/// Live `postgres-sql` tool handle.
pub struct SqlTool {
    name: String,
    #[allow(dead_code)]
    source: Arc<dyn Source>,
    pool: PgPool,
    parameters: Vec<Parameter>,
    template_parameters: Vec<TemplateParameter>,
    auth_required: Vec<String>,
    statement: String,
    manifest: Manifest,
    mcp_manifest: McpManifest,
}

#[async_trait]
impl Tool for SqlTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "postgres-sql"
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn template_parameters(&self) -> &[TemplateParameter] {
        &self.template_parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.auth_required
    }

    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn mcp_manifest(&self) -> &McpManifest {
        &self.mcp_manifest
    }

    async fn invoke(&self, ctx: &RequestContext, params: ParamValues, template_values: HashMap<String, String>) -> Result<Value> {
        let rendered = if self.template_parameters.is_empty() {
            self.statement.clone()
        } else {
            substitute_template(&self.statement, &self.template_parameters, &template_values)?
        };

        let mut query = sqlx::query(&rendered);
        for value in params.values() {
            query = bind_value(query, value);
        }

        let pool = self.pool.clone();
        ctx.run_cancellable(async move {
            let rows = query
                .fetch_all(&pool)
                .await
                .map_err(|e| Error::Backend(format!("postgres-sql query failed: {e}")))?;
            Ok(Value::Array(rows.iter().map(row_to_json).collect()))
        })
        .await
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    }
}

/// Convert one row into an order-preserving JSON object, respecting
/// declared column order (§4.4.3, §9 "order-preserving map").
fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    let mut out = IndexMap::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), pg_cell_to_json(row, idx));
    }
    Value::Object(out.into_iter().collect())
}

/// Best-effort dynamic decode of one Postgres cell to JSON. `sqlx` has no
/// single "decode as JSON" escape hatch for arbitrary column types, so this
/// tries the common scalar types in turn, the same fallback-chain pattern
/// used for polymorphic row mapping elsewhere in the ecosystem.
fn pg_cell_to_json(row: &sqlx::postgres::PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v.map_or(Value::Null, |dt| Value::String(dt.to_string()));
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_auth_required_with_client_oauth_param() {
        let cfg = SqlToolConfig {
            source: "db".into(),
            description: String::new(),
            parameters: vec![Parameter {
                name: "id".into(),
                description: String::new(),
                required: true,
                auth_services: vec![],
                use_client_oauth: true,
                shape: crate::param::ParameterShape::Integer,
            }],
            template_parameters: vec![],
            auth_required: vec!["svc".into()],
            statement: "SELECT 1".into(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_allows_plain_required_params() {
        let cfg = SqlToolConfig {
            source: "db".into(),
            description: String::new(),
            parameters: vec![],
            template_parameters: vec![],
            auth_required: vec![],
            statement: "SELECT 1".into(),
        };
        assert!(cfg.validate().is_ok());
    }
}
