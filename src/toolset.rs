//! Toolset (spec §3, §4.3 step 4-5): a named subset of tools plus a
//! precomputed public manifest, cached as serialized JSON for O(1) list
//! responses.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::tool::Tool;

/// Catalog shape for a `toolsets` document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsetConfig {
    /// Tool names this toolset exposes. Initialization fails if any name
    /// is unknown against the tool map (§4.3 step 5).
    #[serde(rename = "toolNames")]
    pub tool_names: Vec<String>,
}

/// An initialized toolset: a name, its resolved tools, and a cached
/// serialized manifest.
pub struct Toolset {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
    manifest_json: Vec<u8>,
}

impl Toolset {
    /// Resolve `config.tool_names` against `tools`, failing on any unknown
    /// name (§4.3 step 5). `name` may be empty for the synthetic
    /// all-tools toolset (§3).
    pub fn initialize(name: &str, config: &ToolsetConfig, tools: &HashMap<String, Arc<dyn Tool>>) -> Result<Self> {
        let mut resolved = Vec::with_capacity(config.tool_names.len());
        for tool_name in &config.tool_names {
            let tool = tools
                .get(tool_name)
                .ok_or_else(|| Error::Config(format!("toolset `{name}` references unknown tool `{tool_name}`")))?;
            resolved.push(Arc::clone(tool));
        }
        Self::from_tools(name, resolved)
    }

    /// Build the synthetic toolset containing every initialized tool
    /// (§3 "a synthetic toolset with empty name exists and contains every
    /// tool").
    pub fn all(tools: &HashMap<String, Arc<dyn Tool>>) -> Result<Self> {
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        let resolved: Vec<Arc<dyn Tool>> = names.into_iter().map(|n| Arc::clone(&tools[n])).collect();
        Self::from_tools("", resolved)
    }

    fn from_tools(name: &str, tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let manifest: Vec<_> = tools.iter().map(|t| t.manifest()).collect();
        let manifest_json = serde_json::to_vec(&serde_json::json!({
            "serverVersion": env!("CARGO_PKG_VERSION"),
            "tools": manifest,
        }))?;
        Ok(Self {
            name: name.to_string(),
            tools,
            manifest_json,
        })
    }

    /// This toolset's name, empty for the synthetic all-tools toolset.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tools this toolset exposes.
    #[must_use]
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// The cached, serialized manifest. Byte-identical across repeated
    /// calls (§8 "Idempotent manifest").
    #[must_use]
    pub fn manifest_bytes(&self) -> &[u8] {
        &self.manifest_json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::param::ParamValues;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubTool {
        name: String,
        manifest: crate::tool::Manifest,
        mcp_manifest: crate::tool::McpManifest,
    }

    fn stub(name: &str) -> Arc<dyn Tool> {
        Arc::new(StubTool {
            name: name.to_string(),
            manifest: crate::tool::Manifest {
                name: name.to_string(),
                description: String::new(),
                parameters: vec![],
                auth_required: vec![],
            },
            mcp_manifest: crate::tool::McpManifest {
                name: name.to_string(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
            },
        })
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> &'static str {
            "stub"
        }
        fn parameters(&self) -> &[crate::param::Parameter] {
            &[]
        }
        fn auth_required(&self) -> &[String] {
            &[]
        }
        fn manifest(&self) -> &crate::tool::Manifest {
            &self.manifest
        }
        fn mcp_manifest(&self) -> &crate::tool::McpManifest {
            &self.mcp_manifest
        }
        async fn invoke(
            &self,
            _ctx: &RequestContext,
            _params: ParamValues,
            _template_values: std::collections::HashMap<String, String>,
        ) -> crate::error::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn unknown_tool_name_fails_initialization() {
        let tools = HashMap::new();
        let config = ToolsetConfig {
            tool_names: vec!["ghost".to_string()],
        };
        assert!(Toolset::initialize("s1", &config, &tools).is_err());
    }

    #[test]
    fn manifest_only_lists_named_tools() {
        let mut tools = HashMap::new();
        tools.insert("a".to_string(), stub("a"));
        tools.insert("b".to_string(), stub("b"));
        let config = ToolsetConfig {
            tool_names: vec!["a".to_string()],
        };
        let toolset = Toolset::initialize("s1", &config, &tools).unwrap();
        let manifest: serde_json::Value = serde_json::from_slice(toolset.manifest_bytes()).unwrap();
        assert_eq!(manifest["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn synthetic_all_toolset_contains_every_tool() {
        let mut tools = HashMap::new();
        tools.insert("a".to_string(), stub("a"));
        tools.insert("b".to_string(), stub("b"));
        let toolset = Toolset::all(&tools).unwrap();
        assert_eq!(toolset.tools().len(), 2);
    }

    #[test]
    fn manifest_bytes_are_idempotent() {
        let mut tools = HashMap::new();
        tools.insert("a".to_string(), stub("a"));
        let toolset = Toolset::all(&tools).unwrap();
        assert_eq!(toolset.manifest_bytes(), toolset.manifest_bytes());
    }
}
