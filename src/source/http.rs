//! `http` reference source: a `reqwest::Client`-backed handle, grounded in
//! the REST-capability executor pattern (one of the two reference
//! backends, spec §4.6).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::instrumentation::Tracer;

use super::{Source, SourceConfig};

/// Catalog shape for an `http` source document.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSourceConfig {
    /// Base URL every tool statement's path template is resolved against.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Headers sent on every request issued through this source, e.g.
    /// `{"X-Api-Key": "env:MY_API_KEY"}`. Values of the form `env:VAR`
    /// are resolved from the process environment at initialize time —
    /// never logged, never echoed back (§7 "never leak backend
    /// credentials").
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds, defaults to 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[async_trait]
impl SourceConfig for HttpSourceConfig {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn summary(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    async fn initialize(&self, tracer: &Tracer) -> Result<Arc<dyn Source>> {
        let _span = tracer.span("source", "initialize").entered();
        tracing::info!(source_kind = "http", base_url = %self.base_url, "initializing");

        let mut resolved_headers = HashMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            let resolved = if let Some(var) = value.strip_prefix("env:") {
                std::env::var(var)
                    .map_err(|_| Error::Config(format!("env var `{var}` not set for header `{key}`")))?
            } else {
                value.clone()
            };
            resolved_headers.insert(key.clone(), resolved);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("http source client build failed: {e}")))?;

        Ok(Arc::new(HttpSource {
            client,
            base_url: self.base_url.clone(),
            headers: resolved_headers,
        }))
    }
}

/// Live handle: a shared `reqwest::Client` plus resolved default headers.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    headers: HashMap<String, String>,
}

impl HttpSource {
    /// The underlying client, for tool implementations to issue requests.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The source's configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default headers resolved at initialize time.
    #[must_use]
    pub fn default_headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

impl Source for HttpSource {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(default_timeout_secs(), 30);
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = serde_yaml::from_str::<serde_yaml::Value>(
            "baseUrl: https://example.com\nbogus: true\n",
        )
        .unwrap();
        let result: std::result::Result<HttpSourceConfig, _> = serde_yaml::from_value(yaml);
        assert!(result.is_err());
    }
}
