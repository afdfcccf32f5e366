//! Tool (spec §3, §4.6): an invokable operation bound to exactly one
//! source and a parameter schema.

mod http;
mod sql;

pub use http::{HttpToolConfig, HttpTool};
pub use sql::{SqlToolConfig, SqlTool};

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::Result;
use crate::kind_registry::{strict_decode, KindRegistry, RawBody};
use crate::param::{ClaimsByService, ParamValues, Parameter, TemplateParameter};
use crate::source::Source;

/// Public description of a tool, returned by listing endpoints and
/// embedded in toolset manifests (§3 "Manifest").
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Parameters, in declaration order.
    pub parameters: Vec<ManifestParameter>,
    /// Auth services required to invoke this tool, empty if public.
    #[serde(rename = "authRequired")]
    pub auth_required: Vec<String>,
}

/// One parameter's public-facing shape inside a `Manifest`.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestParameter {
    /// Parameter name.
    pub name: String,
    /// Declared JSON-ish type name (`string`, `integer`, `float`,
    /// `boolean`, `array`, `map`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the client must supply this parameter (claim-bound
    /// parameters are never client-suppliable and are reported as
    /// non-required here since the client need not, and cannot, pass
    /// them).
    pub required: bool,
}

/// MCP `tools/list` input schema for one tool (§4.8), a JSON-Schema object.
#[derive(Debug, Clone, Serialize)]
pub struct McpManifest {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    #[serde(rename = "inputSchema")]
    /// JSON-Schema `{type: object, properties: {...}, required: [...]}`.
    pub input_schema: Value,
}

fn manifest_from_parameters(name: &str, description: &str, parameters: &[Parameter], auth_required: &[String]) -> Manifest {
    Manifest {
        name: name.to_string(),
        description: description.to_string(),
        parameters: parameters
            .iter()
            .filter(|p| p.auth_services.is_empty())
            .map(|p| ManifestParameter {
                name: p.name.clone(),
                type_name: type_name_of(p).to_string(),
                description: p.description.clone(),
                required: p.required,
            })
            .collect(),
        auth_required: auth_required.to_vec(),
    }
}

fn type_name_of(param: &Parameter) -> &'static str {
    use crate::param::ParameterShape;
    match param.shape {
        ParameterShape::String => "string",
        ParameterShape::Integer => "integer",
        ParameterShape::Float => "float",
        ParameterShape::Boolean => "boolean",
        ParameterShape::Array { .. } => "array",
        ParameterShape::Map { .. } => "map",
    }
}

fn json_schema_type(param: &Parameter) -> Value {
    use crate::param::ParameterShape;
    match &param.shape {
        ParameterShape::String => serde_json::json!({"type": "string"}),
        ParameterShape::Integer => serde_json::json!({"type": "integer"}),
        ParameterShape::Float => serde_json::json!({"type": "number"}),
        ParameterShape::Boolean => serde_json::json!({"type": "boolean"}),
        ParameterShape::Array { items } => serde_json::json!({
            "type": "array",
            "items": json_schema_type(items),
        }),
        ParameterShape::Map { .. } => serde_json::json!({"type": "object"}),
    }
}

fn mcp_manifest_from_parameters(name: &str, description: &str, parameters: &[Parameter]) -> McpManifest {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for p in parameters.iter().filter(|p| p.auth_services.is_empty()) {
        let mut schema = json_schema_type(p);
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("description".into(), Value::String(p.description.clone()));
        }
        properties.insert(p.name.clone(), schema);
        if p.required {
            required.push(Value::String(p.name.clone()));
        }
    }
    McpManifest {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        }),
    }
}

/// The `Tool` contract (§4.6): bound to exactly one source, invokable with
/// parsed parameters. State machine `New → ParsedParams → Authorized →
/// Executing → Done|Error` is enforced by the call sequence the gateway
/// drives this trait through, not by internal state on the type.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as declared in the catalog.
    fn name(&self) -> &str;

    /// Kind tag, e.g. `"postgres-sql"`.
    fn kind(&self) -> &'static str;

    /// Declared parameters, in declaration order.
    fn parameters(&self) -> &[Parameter];

    /// Template parameters: a list kept separate from `parameters`,
    /// spliced into backend-specific text rather than safe-bound (§3,
    /// §4.4.2).
    fn template_parameters(&self) -> &[TemplateParameter] {
        &[]
    }

    /// Auth service names, any one of which authorizes invocation.
    fn auth_required(&self) -> &[String];

    /// Public manifest, rendered once at initialize time.
    fn manifest(&self) -> &Manifest;

    /// MCP input schema, rendered once at initialize time.
    fn mcp_manifest(&self) -> &McpManifest;

    /// Parse and coerce `raw` against this tool's parameter schema,
    /// resolving auth-bound values from `claims` (§4.4.1).
    fn parse_params(&self, raw: &serde_json::Map<String, Value>, claims: &ClaimsByService) -> Result<ParamValues> {
        crate::param::parse_params(self.parameters(), raw, claims)
    }

    /// Resolve this tool's `template_parameters()` directly from `raw`,
    /// independently of `parse_params` (§3: a separate list, never
    /// client-suppliable as a safe-bound value).
    fn parse_template_params(&self, raw: &serde_json::Map<String, Value>) -> Result<HashMap<String, String>> {
        crate::param::parse_template_params(self.template_parameters(), raw)
    }

    /// Whether `verified_service_names` satisfies this tool's
    /// `authRequired` (§4.5: empty `authRequired` is always authorized;
    /// otherwise any-of-match).
    fn authorized(&self, verified_service_names: &HashSet<String>) -> bool {
        self.auth_required().is_empty()
            || self.auth_required().iter().any(|s| verified_service_names.contains(s))
    }

    /// Whether this tool refuses invocation when the request carries no
    /// bearer token at all, regardless of `authRequired` (§9 Open
    /// Questions: advisory boolean, delegation itself is the backend
    /// driver's concern).
    fn requires_client_authorization(&self) -> bool {
        false
    }

    /// Execute against the bound source. `ctx` carries cancellation, the
    /// caller's verified claims, and its raw access token. `template_values`
    /// holds this tool's `template_parameters()`, resolved from the raw
    /// request input by [`Tool::parse_template_params`] — never derived
    /// from `params`.
    async fn invoke(&self, ctx: &RequestContext, params: ParamValues, template_values: HashMap<String, String>) -> Result<Value>;
}

/// Immutable, YAML-decoded tool configuration, consumed once by the
/// Resource Manager to bind a tool to its named source (§3, §4.3 step 3).
#[async_trait]
pub trait ToolConfig: Send + Sync {
    /// Kind tag, matching the registry key this config was decoded under.
    fn kind(&self) -> &'static str;

    /// Name of the source this tool must bind to.
    fn source_name(&self) -> &str;

    /// A JSON summary of this config, for the `/api/tool` listing
    /// endpoints (§4.7, §8 "Redaction").
    fn summary(&self) -> serde_json::Value;

    /// `authRequired` and any parameter's `useClientOAuth` are mutually
    /// exclusive (§3, §8 "Auth mutual exclusion"); validated once, at
    /// decode time, by the concrete kind's `Deserialize` impl or here.
    fn validate(&self) -> Result<()>;

    /// Bind to `source`, producing the live `Tool` handle.
    async fn initialize(&self, name: &str, source: Arc<dyn Source>) -> Result<Arc<dyn Tool>>;
}

/// Register the reference tool kinds this repo ships (`postgres-sql`,
/// `http`) into a fresh registry (§9 "explicit builder").
#[must_use]
pub fn build_registry() -> KindRegistry<dyn ToolConfig> {
    let mut registry = KindRegistry::new();
    registry.register("postgres-sql", decode_sql);
    registry.register("http", decode_http);
    registry
}

fn decode_sql(body: RawBody) -> Result<Box<dyn ToolConfig>> {
    let cfg: SqlToolConfig = strict_decode(body)?;
    cfg.validate()?;
    Ok(Box::new(cfg))
}

fn decode_http(body: RawBody) -> Result<Box<dyn ToolConfig>> {
    let cfg: HttpToolConfig = strict_decode(body)?;
    cfg.validate()?;
    Ok(Box::new(cfg))
}

/// Shared mutual-exclusion check for `authRequired` vs. per-parameter
/// `useClientOAuth` (§3, §8).
pub(crate) fn validate_auth_mutual_exclusion(auth_required: &[String], parameters: &[Parameter]) -> Result<()> {
    if auth_required.is_empty() {
        return Ok(());
    }
    if let Some(p) = parameters.iter().find(|p| p.use_client_oauth) {
        return Err(crate::error::Error::Config(format!(
            "tool declares both `authRequired` and parameter `{}` with `useClientOAuth: true`",
            p.name
        )));
    }
    Ok(())
}

/// Interpolation map built from resolved parameter values, for use by
/// kinds that substitute params directly into strings (e.g. HTTP path
/// templates) rather than native safe binding.
pub(crate) fn stringify_params(params: &ParamValues) -> HashMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParameterShape;

    fn param(name: &str, required: bool, use_client_oauth: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            description: String::new(),
            required,
            auth_services: Vec::new(),
            use_client_oauth,
            shape: ParameterShape::String,
        }
    }

    #[test]
    fn mutual_exclusion_passes_when_auth_required_is_empty() {
        assert!(validate_auth_mutual_exclusion(&[], &[param("p", true, true)]).is_ok());
    }

    #[test]
    fn mutual_exclusion_fails_when_both_set() {
        let err = validate_auth_mutual_exclusion(&["svc".to_string()], &[param("p", true, true)]).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn mutual_exclusion_passes_without_client_oauth_params() {
        assert!(validate_auth_mutual_exclusion(&["svc".to_string()], &[param("p", true, false)]).is_ok());
    }

    #[test]
    fn manifest_hides_auth_bound_parameters() {
        let mut p = param("email", true, false);
        p.auth_services = vec![crate::param::AuthBinding {
            service_name: "svc".into(),
            field: "email".into(),
        }];
        let manifest = manifest_from_parameters("greet", "desc", &[p], &[]);
        assert!(manifest.parameters.is_empty());
    }

    #[test]
    fn authorized_is_true_for_empty_auth_required() {
        struct Noop;
        #[async_trait]
        impl Tool for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn kind(&self) -> &'static str {
                "noop"
            }
            fn parameters(&self) -> &[Parameter] {
                &[]
            }
            fn auth_required(&self) -> &[String] {
                &[]
            }
            fn manifest(&self) -> &Manifest {
                unreachable!()
            }
            fn mcp_manifest(&self) -> &McpManifest {
                unreachable!()
            }
            async fn invoke(&self, _ctx: &RequestContext, _params: ParamValues, _template_values: HashMap<String, String>) -> Result<Value> {
                Ok(Value::Null)
            }
        }
        assert!(Noop.authorized(&HashSet::new()));
    }
}
