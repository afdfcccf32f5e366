//! Parameter Engine (spec §3, §4.4): declares a parameter schema, parses and
//! coerces inbound JSON, and resolves auth-bound values from verified claims.

use std::collections::HashMap;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// An auth service binding on a parameter: the value is filled from the
/// named service's verified claims rather than accepted from the client.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AuthBinding {
    /// Auth service name, resolved against the Resource Manager.
    #[serde(rename = "name")]
    pub service_name: String,
    /// Field to read out of that service's claims map.
    pub field: String,
}

/// Scalar element type, used by `array`/`map` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// Boolean
    Boolean,
}

/// A parameter descriptor. Deserialized directly from the catalog's
/// per-tool `parameters` list; the `type` tag selects the variant-specific
/// shape (§3 Data Model, §9 "tagged variant").
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Parameter {
    /// Parameter name, used as the JSON object key on invoke and as the
    /// insertion key of the resulting `ParamValues`.
    pub name: String,
    /// Human-readable description surfaced in manifests.
    #[serde(default)]
    pub description: String,
    /// Defaults to required.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Non-empty iff this parameter's value is claim-bound rather than
    /// client-suppliable.
    #[serde(rename = "authServices", default)]
    pub auth_services: Vec<AuthBinding>,
    /// Whether this parameter's value is forwarded from the client's OAuth
    /// token rather than the catalog's own `authServices` binding.
    /// Mutually exclusive with the tool's `authRequired` (§3, §8 "Auth
    /// mutual exclusion").
    #[serde(rename = "useClientOAuth", default)]
    pub use_client_oauth: bool,
    /// Type-specific shape.
    #[serde(flatten)]
    pub shape: ParameterShape,
}

fn default_true() -> bool {
    true
}

/// The type-specific part of a `Parameter`.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterShape {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// Boolean
    Boolean,
    /// Array of a single, uniform element parameter.
    Array {
        /// Element schema; the element's own `name`/`required`/`authServices`
        /// are ignored, only its `shape` is used.
        items: Box<Parameter>,
    },
    /// Map of string keys to a uniform scalar value type.
    Map {
        /// Declared value type, e.g. `string`.
        #[serde(rename = "valueType")]
        value_type: ScalarKind,
    },
}

/// Parsed, order-preserving parameter values. Insertion order equals
/// declaration order (§4.4.1 step 5, §8 "Parameter order preservation").
pub type ParamValues = IndexMap<String, Value>;

/// Verified claims, keyed by auth service name, each a JSON object.
pub type ClaimsByService = HashMap<String, serde_json::Map<String, Value>>;

/// Parse and coerce a raw JSON object against a declared parameter list.
///
/// Fail-fast: the first parameter error aborts parsing (§4.4.1).
pub fn parse_params(
    parameters: &[Parameter],
    raw: &serde_json::Map<String, Value>,
    claims: &ClaimsByService,
) -> Result<ParamValues> {
    let mut out = ParamValues::with_capacity(parameters.len());
    for param in parameters {
        let value = resolve_one(param, raw, claims)?;
        out.insert(param.name.clone(), value);
    }
    Ok(out)
}

fn resolve_one(
    param: &Parameter,
    raw: &serde_json::Map<String, Value>,
    claims: &ClaimsByService,
) -> Result<Value> {
    if !param.auth_services.is_empty() {
        let binding = param
            .auth_services
            .iter()
            .find(|b| claims.contains_key(&b.service_name));
        let Some(binding) = binding else {
            return Err(Error::Unauthorized(format!(
                "parameter `{}` requires one of [{}] to be verified",
                param.name,
                param
                    .auth_services
                    .iter()
                    .map(|b| b.service_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };
        let claim_set = &claims[&binding.service_name];
        let Some(claim_value) = claim_set.get(&binding.field) else {
            return Err(Error::Unauthorized(format!(
                "parameter `{}`: claim `{}` missing from `{}`",
                param.name, binding.field, binding.service_name
            )));
        };
        return coerce(&param.name, claim_value, &param.shape);
    }

    match raw.get(&param.name) {
        Some(value) => coerce(&param.name, value, &param.shape),
        None if param.required => Err(Error::BadParam {
            name: param.name.clone(),
            reason: "missing required parameter".into(),
        }),
        None => Ok(default_for(&param.shape)),
    }
}

fn default_for(shape: &ParameterShape) -> Value {
    match shape {
        ParameterShape::Array { .. } => Value::Array(Vec::new()),
        ParameterShape::Map { .. } => Value::Object(serde_json::Map::new()),
        _ => Value::Null,
    }
}

fn coerce(name: &str, value: &Value, shape: &ParameterShape) -> Result<Value> {
    match shape {
        ParameterShape::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(bad_type(name, "string", other)),
        },
        ParameterShape::Integer => coerce_integer(name, value),
        ParameterShape::Float => match value.as_f64() {
            Some(f) => Ok(Value::from(f)),
            None => Err(bad_type(name, "float", value)),
        },
        ParameterShape::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(bad_type(name, "boolean", other)),
        },
        ParameterShape::Array { items } => {
            let Value::Array(elements) = value else {
                return Err(bad_type(name, "array", value));
            };
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                out.push(coerce(name, element, &items.shape)?);
            }
            Ok(Value::Array(out))
        }
        ParameterShape::Map { value_type } => {
            let Value::Object(map) = value else {
                return Err(bad_type(name, "map", value));
            };
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                let coerced = coerce_scalar(name, v, *value_type)?;
                out.insert(key.clone(), coerced);
            }
            Ok(Value::Object(out))
        }
    }
}

fn coerce_scalar(name: &str, value: &Value, kind: ScalarKind) -> Result<Value> {
    match kind {
        ScalarKind::String => coerce(name, value, &ParameterShape::String),
        ScalarKind::Integer => coerce_integer(name, value),
        ScalarKind::Float => coerce(name, value, &ParameterShape::Float),
        ScalarKind::Boolean => coerce(name, value, &ParameterShape::Boolean),
    }
}

/// Narrow coercion rule (§4.4.1 step 4): a JSON number decoded as
/// floating point must downcast to integer without loss; any other
/// cross-type coercion (e.g. string→int) is rejected.
fn coerce_integer(name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.is_finite() {
                    Ok(Value::from(f as i64))
                } else {
                    Err(Error::BadParam {
                        name: name.to_string(),
                        reason: format!("{f} is not an integer without loss"),
                    })
                }
            } else {
                Err(bad_type(name, "integer", value))
            }
        }
        other => Err(bad_type(name, "integer", other)),
    }
}

fn bad_type(name: &str, expected: &str, got: &Value) -> Error {
    Error::BadParam {
        name: name.to_string(),
        reason: format!("expected {expected}, got {}", type_name(got)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Backend-identifier grammar used to validate template parameter values
/// before splicing them into statement text (§4.4.2).
static IDENTIFIER_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("static regex"));

/// A template parameter: spliced into the statement text before execution,
/// never bound as a safe query parameter (§3, §4.4.2).
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TemplateParameter {
    /// Name, matched against `{{.name}}` placeholders in the statement.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Validate a template parameter value against the identifier grammar.
pub fn validate_template_value(name: &str, value: &str) -> Result<()> {
    if IDENTIFIER_GRAMMAR.is_match(value) {
        Ok(())
    } else {
        Err(Error::BadTemplateParam {
            name: name.to_string(),
            reason: format!("`{value}` does not match the identifier grammar"),
        })
    }
}

/// Substitute every `{{.key}}` placeholder in `statement` with its
/// validated value. Must happen before any safe parameter binding
/// (§4.4.2).
pub fn substitute_template(
    statement: &str,
    template_params: &[TemplateParameter],
    values: &HashMap<String, String>,
) -> Result<String> {
    let mut rendered = statement.to_string();
    for param in template_params {
        let value = values.get(&param.name).ok_or_else(|| Error::BadTemplateParam {
            name: param.name.clone(),
            reason: "missing required template parameter".into(),
        })?;
        validate_template_value(&param.name, value)?;
        let placeholder = format!("{{{{.{}}}}}", param.name);
        rendered = rendered.replace(&placeholder, value);
    }
    Ok(rendered)
}

/// Resolve template parameter values directly from the raw request input,
/// independently of the safe-bound `parameters`/`ParamValues` path (§3:
/// template parameters are "a separate list"). A name declared in
/// `templateParameters` must appear in `raw` as a JSON string; this never
/// reads from, or is influenced by, the regular parameter schema.
pub fn parse_template_params(
    template_parameters: &[TemplateParameter],
    raw: &serde_json::Map<String, Value>,
) -> Result<HashMap<String, String>> {
    let mut values = HashMap::with_capacity(template_parameters.len());
    for param in template_parameters {
        let value = raw.get(&param.name).ok_or_else(|| Error::BadTemplateParam {
            name: param.name.clone(),
            reason: "missing required template parameter".into(),
        })?;
        let Value::String(s) = value else {
            return Err(Error::BadTemplateParam {
                name: param.name.clone(),
                reason: "template parameter must be a string".into(),
            });
        };
        values.insert(param.name.clone(), s.clone());
    }
    Ok(values)
}
