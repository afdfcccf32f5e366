//! Config Loader (spec §4.2, §6.1): parses the multi-document YAML catalog,
//! dispatches each document to the correct kind registry, and produces four
//! typed maps. Does not resolve cross-references — that is the Resource
//! Manager (§4.3, `crate::manager`).

use std::collections::HashMap;

use serde::Deserialize as _;
use serde_yaml::Value as YamlValue;

use crate::auth::AuthServiceConfig;
use crate::error::{Error, Result};
use crate::kind_registry::KindRegistry;
use crate::source::SourceConfig;
use crate::tool::ToolConfig;
use crate::toolset::ToolsetConfig;

/// The four registries a catalog document can dispatch into.
pub struct Registries<'a> {
    /// Source kind registry.
    pub sources: &'a KindRegistry<dyn SourceConfig>,
    /// Auth service kind registry.
    pub auth_services: &'a KindRegistry<dyn AuthServiceConfig>,
    /// Tool kind registry.
    pub tools: &'a KindRegistry<dyn ToolConfig>,
}

/// The four maps produced by the loader, keyed by name within their
/// namespace (§3 "Name").
#[derive(Default)]
pub struct Catalog {
    /// Decoded source configs, not yet initialized.
    pub sources: HashMap<String, Box<dyn SourceConfig>>,
    /// Decoded auth service configs, not yet initialized.
    pub auth_services: HashMap<String, Box<dyn AuthServiceConfig>>,
    /// Decoded tool configs, not yet bound to a source.
    pub tools: HashMap<String, Box<dyn ToolConfig>>,
    /// Decoded toolset configs, not yet resolved against the tool map.
    pub toolsets: HashMap<String, ToolsetConfig>,
}

const CATEGORIES: [&str; 4] = ["sources", "authServices", "tools", "toolsets"];

/// Parse `bytes` as a multi-document (`---`-separated) YAML catalog, or
/// the legacy single-document shape (§6.1), and dispatch each entry
/// through `registries`.
pub fn load(bytes: &[u8], registries: &Registries) -> Result<Catalog> {
    let mut catalog = Catalog::default();

    for document in serde_yaml::Deserializer::from_slice(bytes) {
        let value = YamlValue::deserialize(document).map_err(|e| Error::Config(e.to_string()))?;
        if matches!(value, YamlValue::Null) {
            continue;
        }
        let YamlValue::Mapping(mapping) = value else {
            return Err(Error::Config("catalog document must be a YAML mapping".into()));
        };

        if let Some(kind_value) = mapping.get("kind") {
            // Primary shape (§6.1): one resource per document, tagged by
            // top-level `kind`.
            let category = kind_value
                .as_str()
                .ok_or_else(|| Error::Config("document `kind` must be a string".into()))?
                .to_string();
            validate_category(&category)?;

            let name = mapping
                .get("name")
                .and_then(YamlValue::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Config(format!("document of kind `{category}` missing non-empty `name`")))?
                .to_string();

            let mut body = mapping;
            body.remove("kind");
            body.remove("name");
            dispatch(&mut catalog, registries, &category, &name, body)?;
        } else {
            // Legacy shape (§6.1): top-level map keys per category, each
            // mapping name → body.
            for category in CATEGORIES {
                let Some(YamlValue::Mapping(entries)) = mapping.get(category) else {
                    continue;
                };
                for (name_value, body_value) in entries {
                    let name = name_value
                        .as_str()
                        .ok_or_else(|| Error::Config(format!("legacy `{category}` entry has non-string name")))?
                        .to_string();
                    let YamlValue::Mapping(body) = body_value.clone() else {
                        return Err(Error::Config(format!("legacy `{category}.{name}` body must be a mapping")));
                    };
                    dispatch(&mut catalog, registries, category, &name, body)?;
                }
            }
        }
    }

    Ok(catalog)
}

fn validate_category(category: &str) -> Result<()> {
    if CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "unknown document kind `{category}`, expected one of {CATEGORIES:?}"
        )))
    }
}

fn dispatch(
    catalog: &mut Catalog,
    registries: &Registries,
    category: &str,
    name: &str,
    mut body: serde_yaml::Mapping,
) -> Result<()> {
    match category {
        "toolsets" => {
            body.remove("type");
            body.remove("kind");
            let config: ToolsetConfig =
                serde_yaml::from_value(YamlValue::Mapping(body)).map_err(|e| Error::Config(format!("toolset `{name}`: {e}")))?;
            catalog.toolsets.insert(name.to_string(), config);
            Ok(())
        }
        "sources" | "authServices" | "tools" => {
            let type_tag = body
                .remove("type")
                .or_else(|| body.remove("kind"))
                .ok_or_else(|| Error::Config(format!("`{category}.{name}` missing `type`")))?;
            let type_tag = type_tag
                .as_str()
                .ok_or_else(|| Error::Config(format!("`{category}.{name}`'s `type` must be a string")))?
                .to_string();

            let body_value = YamlValue::Mapping(body);
            match category {
                "sources" => {
                    let decoded = registries
                        .sources
                        .decode(&type_tag, body_value)
                        .map_err(|e| Error::Config(format!("source `{name}` ({type_tag}): {e}")))?;
                    catalog.sources.insert(name.to_string(), decoded);
                }
                "authServices" => {
                    let decoded = registries
                        .auth_services
                        .decode(&type_tag, body_value)
                        .map_err(|e| Error::Config(format!("auth service `{name}` ({type_tag}): {e}")))?;
                    catalog.auth_services.insert(name.to_string(), decoded);
                }
                "tools" => {
                    let decoded = registries
                        .tools
                        .decode(&type_tag, body_value)
                        .map_err(|e| Error::Config(format!("tool `{name}` ({type_tag}): {e}")))?;
                    catalog.tools.insert(name.to_string(), decoded);
                }
                _ => unreachable!(),
            }
            Ok(())
        }
        _ => unreachable!("validated by validate_category"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registries<'a>(
        sources: &'a KindRegistry<dyn SourceConfig>,
        auth_services: &'a KindRegistry<dyn AuthServiceConfig>,
        tools: &'a KindRegistry<dyn ToolConfig>,
    ) -> Registries<'a> {
        Registries {
            sources,
            auth_services,
            tools,
        }
    }

    #[test]
    fn primary_shape_parses_toolset() {
        let yaml = b"kind: toolsets\nname: s1\ntoolNames: [a, b]\n";
        let sources = crate::source::build_registry();
        let auth_services = crate::auth::build_registry();
        let tools = crate::tool::build_registry();
        let catalog = load(yaml, &registries(&sources, &auth_services, &tools)).unwrap();
        assert_eq!(catalog.toolsets["s1"].tool_names, vec!["a", "b"]);
    }

    #[test]
    fn legacy_shape_parses_toolset() {
        let yaml = b"toolsets:\n  s1:\n    toolNames: [a]\n";
        let sources = crate::source::build_registry();
        let auth_services = crate::auth::build_registry();
        let tools = crate::tool::build_registry();
        let catalog = load(yaml, &registries(&sources, &auth_services, &tools)).unwrap();
        assert_eq!(catalog.toolsets["s1"].tool_names, vec!["a"]);
    }

    #[test]
    fn unknown_top_level_kind_is_config_error() {
        let yaml = b"kind: bogus\nname: x\n";
        let sources = crate::source::build_registry();
        let auth_services = crate::auth::build_registry();
        let tools = crate::tool::build_registry();
        let err = load(yaml, &registries(&sources, &auth_services, &tools)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn strict_decoding_rejects_unknown_field_in_source_body() {
        let yaml = b"kind: sources\nname: db\ntype: postgres-sql\ndsn: postgres://u:p@localhost/d\nbogus: true\n";
        let sources = crate::source::build_registry();
        let auth_services = crate::auth::build_registry();
        let tools = crate::tool::build_registry();
        let err = load(yaml, &registries(&sources, &auth_services, &tools)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn multi_document_catalog_parses_all_documents() {
        let yaml = b"\
kind: sources
name: db
type: postgres-sql
dsn: postgres://u:p@localhost/d
---
kind: tools
name: greet
type: postgres-sql
source: db
statement: SELECT 1
---
kind: toolsets
name: s1
toolNames: [greet]
";
        let sources = crate::source::build_registry();
        let auth_services = crate::auth::build_registry();
        let tools = crate::tool::build_registry();
        let catalog = load(yaml, &registries(&sources, &auth_services, &tools)).unwrap();
        assert_eq!(catalog.sources.len(), 1);
        assert_eq!(catalog.tools.len(), 1);
        assert_eq!(catalog.toolsets.len(), 1);
    }
}
