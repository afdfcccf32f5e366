//! `http` reference tool kind: a URL-template tool bound to an `http`
//! source, grounded in the same `{param}`/`{env.VAR}` substitution
//! approach as a REST capability executor (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::param::{substitute_template, ParamValues, Parameter, TemplateParameter};
use crate::source::{HttpSource, Source};

use super::{manifest_from_parameters, mcp_manifest_from_parameters, stringify_params, validate_auth_mutual_exclusion, Manifest, McpManifest, Tool, ToolConfig};

/// Catalog shape for an `http` tool document.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpToolConfig {
    /// Name of the `http` source to bind to.
    pub source: String,
    /// Human-readable description, surfaced in manifests.
    #[serde(default)]
    pub description: String,
    /// HTTP method, defaults to `GET`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Declared parameters. Any parameter not named in `path` is appended
    /// as a query-string argument; `path` may reference parameters as
    /// `{name}`.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Template parameters, spliced into `path` before parameter
    /// substitution (§4.4.2).
    #[serde(rename = "templateParameters", default)]
    pub template_parameters: Vec<TemplateParameter>,
    /// Auth service names, any one of which authorizes invocation.
    #[serde(rename = "authRequired", default)]
    pub auth_required: Vec<String>,
    /// Path template, resolved against the source's `baseUrl`, e.g.
    /// `/users/{id}`.
    pub path: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpToolConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_auth_mutual_exclusion(&self.auth_required, &self.parameters)
    }
}

#[async_trait]
impl ToolConfig for HttpToolConfig {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn source_name(&self) -> &str {
        &self.source
    }

    fn summary(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn validate(&self) -> Result<()> {
        HttpToolConfig::validate(self)
    }

    async fn initialize(&self, name: &str, source: Arc<dyn Source>) -> Result<Arc<dyn Tool>> {
        if source.kind() != "http" {
            return Err(Error::Config(format!(
                "tool `{name}` requires an `http` source, got `{}`",
                source.kind()
            )));
        }
        let method = self
            .method
            .parse::<reqwest::Method>()
            .map_err(|e| Error::Config(format!("invalid HTTP method `{}`: {e}", self.method)))?;

        let manifest = manifest_from_parameters(name, &self.description, &self.parameters, &self.auth_required);
        let mcp_manifest = mcp_manifest_from_parameters(name, &self.description, &self.parameters);

        Ok(Arc::new(HttpTool {
            name: name.to_string(),
            source,
            method,
            parameters: self.parameters.clone(),
            template_parameters: self.template_parameters.clone(),
            auth_required: self.auth_required.clone(),
            path: self.path.clone(),
            manifest,
            mcp_manifest,
        }))
    }
}

/// Live `http` tool handle.
pub struct HttpTool {
    name: String,
    source: Arc<dyn Source>,
    method: reqwest::Method,
    parameters: Vec<Parameter>,
    template_parameters: Vec<TemplateParameter>,
    auth_required: Vec<String>,
    path: String,
    manifest: Manifest,
    mcp_manifest: McpManifest,
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "http"
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
        let http = self
            .source
            .as_any()
            .downcast_ref::<HttpSource>()
            .ok_or_else(|| Error::Internal("http source downcast failed".into()))?;

        let string_values = stringify_params(&params);

        let path = if self.template_parameters.is_empty() {
            self.path.clone()
        } else {
            substitute_template(&self.path, &self.template_parameters, &template_values)?
        };

        let mut rendered_path = path.clone();
        let mut leftover_query: Vec<(String, String)> = Vec::new();
        for (key, value) in &string_values {
            let placeholder = format!("{{{key}}}");
            if rendered_path.contains(&placeholder) {
                rendered_path = rendered_path.replace(&placeholder, value);
            } else {
                leftover_query.push((key.clone(), value.clone()));
            }
        }

        let url = format!("{}{}", http.base_url().trim_end_matches('/'), rendered_path);
        let mut builder = http.client().request(self.method.clone(), url).query(&leftover_query);
        for (key, value) in http.default_headers() {
            builder = builder.header(key, value);
        }

        ctx.run_cancellable(async move {
            let response = builder
                .send()
                .await
                .map_err(|e| Error::Backend(format!("http tool request failed: {e}")))?;
            let status = response.status();
            let body: Value = response
                .json()
                .await
                .map_err(|e| Error::Backend(format!("http tool response decode failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Backend(format!("http tool received status {status}")));
            }
            Ok(body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_method_is_get() {
        assert_eq!(default_method(), "GET");
    }

    #[test]
    fn validate_rejects_auth_required_with_client_oauth_param() {
        let cfg = HttpToolConfig {
            source: "api".into(),
            description: String::new(),
            method: "GET".into(),
            parameters: vec![Parameter {
                name: "id".into(),
                description: String::new(),
                required: true,
                auth_services: vec![],
                use_client_oauth: true,
                shape: crate::param::ParameterShape::String,
            }],
            template_parameters: vec![],
            auth_required: vec!["svc".into()],
            path: "/users/{id}".into(),
        };
        assert!(cfg.validate().is_err());
    }
}
