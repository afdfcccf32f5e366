//! Resource Manager (spec §3, §4.3): the process-wide, read-only-after-
//! startup map of every initialized source, auth service, tool, and
//! toolset. Owns all four; tools only borrow their source.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::instrumentation::Tracer;
use crate::source::Source;
use crate::tool::Tool;
use crate::toolset::Toolset;

/// The fully initialized resource graph. Read-only after `initialize`
/// returns (§5 "Shared resources": "no lock is needed for reads").
pub struct ResourceManager {
    sources: HashMap<String, Arc<dyn Source>>,
    auth_services: HashMap<String, Arc<dyn AuthService>>,
    tools: HashMap<String, Arc<dyn Tool>>,
    toolsets: HashMap<String, Toolset>,
    source_summaries: HashMap<String, ResourceSummary>,
    auth_service_summaries: HashMap<String, ResourceSummary>,
    tool_summaries: HashMap<String, ResourceSummary>,
}

/// A name's kind tag plus its config summary, captured at decode time for
/// the `/api/*` listing endpoints (§4.7) — the live `Source`/`AuthService`/
/// `Tool` handles don't retain their originating config, so this is saved
/// alongside initialization rather than reconstructed later.
#[derive(Debug, Clone)]
pub struct ResourceSummary {
    /// Kind tag, e.g. `"postgres-sql"`.
    pub kind: &'static str,
    /// Config summary as returned by the kind's `summary()` method, not yet
    /// redacted — callers redact before serializing to a response.
    pub config: serde_json::Value,
}

impl ResourceManager {
    /// Topological construction with explicit failure points (§4.3):
    /// sources → auth services → tools → synthetic all-tools toolset →
    /// named toolsets. Any step's failure aborts startup.
    pub async fn initialize(catalog: Catalog, tracer: &Tracer) -> Result<Self> {
        let mut sources = HashMap::with_capacity(catalog.sources.len());
        let mut source_summaries = HashMap::with_capacity(catalog.sources.len());
        for (name, config) in &catalog.sources {
            let _span = tracer.span("source", "initialize").entered();
            tracing::info!(source_name = %name, source_kind = config.kind(), "initializing source");
            source_summaries.insert(
                name.clone(),
                ResourceSummary {
                    kind: config.kind(),
                    config: config.summary(),
                },
            );
            let source = config.initialize(tracer).await?;
            sources.insert(name.clone(), source);
        }

        let mut auth_services = HashMap::with_capacity(catalog.auth_services.len());
        let mut auth_service_summaries = HashMap::with_capacity(catalog.auth_services.len());
        for (name, config) in &catalog.auth_services {
            let _span = tracer.span("auth_service", "initialize").entered();
            tracing::info!(auth_service_name = %name, auth_service_kind = config.kind(), "initializing auth service");
            auth_service_summaries.insert(
                name.clone(),
                ResourceSummary {
                    kind: config.kind(),
                    config: config.summary(),
                },
            );
            let auth_service = config.initialize().await?;
            auth_services.insert(name.clone(), auth_service);
        }

        let mut tools = HashMap::with_capacity(catalog.tools.len());
        let mut tool_summaries = HashMap::with_capacity(catalog.tools.len());
        for (name, config) in &catalog.tools {
            let source = sources
                .get(config.source_name())
                .ok_or_else(|| Error::Config(format!("tool `{name}` references unknown source `{}`", config.source_name())))?;
            tool_summaries.insert(
                name.clone(),
                ResourceSummary {
                    kind: config.kind(),
                    config: config.summary(),
                },
            );
            let tool = config.initialize(name, Arc::clone(source)).await?;
            tools.insert(name.clone(), tool);
        }

        let mut toolsets = HashMap::with_capacity(catalog.toolsets.len() + 1);
        toolsets.insert(String::new(), Toolset::all(&tools)?);
        for (name, config) in &catalog.toolsets {
            let toolset = Toolset::initialize(name, config, &tools)?;
            toolsets.insert(name.clone(), toolset);
        }

        Ok(Self {
            sources,
            auth_services,
            tools,
            toolsets,
            source_summaries,
            auth_service_summaries,
            tool_summaries,
        })
    }

    /// Look up a source by name.
    #[must_use]
    pub fn get_source(&self, name: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(name)
    }

    /// Look up an auth service by name.
    #[must_use]
    pub fn get_auth_service(&self, name: &str) -> Option<&Arc<dyn AuthService>> {
        self.auth_services.get(name)
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Look up a toolset by name; `""` is the synthetic all-tools toolset.
    #[must_use]
    pub fn get_toolset(&self, name: &str) -> Option<&Toolset> {
        self.toolsets.get(name)
    }

    /// Snapshot iteration over every source, for listing endpoints (§4.7).
    pub fn sources_map(&self) -> &HashMap<String, Arc<dyn Source>> {
        &self.sources
    }

    /// Snapshot iteration over every auth service.
    pub fn auth_services_map(&self) -> &HashMap<String, Arc<dyn AuthService>> {
        &self.auth_services
    }

    /// Snapshot iteration over every tool.
    pub fn tools_map(&self) -> &HashMap<String, Arc<dyn Tool>> {
        &self.tools
    }

    /// Snapshot iteration over every toolset, including the synthetic
    /// empty-name all-tools toolset.
    pub fn toolsets_map(&self) -> &HashMap<String, Toolset> {
        &self.toolsets
    }

    /// Kind + un-redacted config summary for every source, for `/api/source`
    /// listing endpoints (§4.7). Callers redact before responding.
    pub fn source_summaries(&self) -> &HashMap<String, ResourceSummary> {
        &self.source_summaries
    }

    /// Kind + un-redacted config summary for every auth service.
    pub fn auth_service_summaries(&self) -> &HashMap<String, ResourceSummary> {
        &self.auth_service_summaries
    }

    /// Kind + un-redacted config summary for every tool.
    pub fn tool_summaries(&self) -> &HashMap<String, ResourceSummary> {
        &self.tool_summaries
    }

    /// Every auth service names verified for a given header set, used by
    /// the server's auth-header-extraction middleware (§4.5).
    pub async fn verify_headers(
        &self,
        headers: &HashMap<String, String>,
    ) -> crate::param::ClaimsByService {
        let mut claims = crate::param::ClaimsByService::new();
        for (header_name, token) in headers {
            let Some(service_name) = header_name.strip_suffix("_token") else {
                continue;
            };
            let Some(auth_service) = self.auth_services.get(service_name) else {
                continue;
            };
            match auth_service.verify(token).await {
                Ok(verified_claims) => {
                    claims.insert(service_name.to_string(), verified_claims);
                }
                Err(e) => {
                    tracing::debug!(service = %service_name, error = %e, "token verification failed");
                }
            }
        }
        claims
    }
}
