//! Source (spec §3, §4.3): an initialized, reusable connection/session
//! handle to one backend. Shared by every tool that names it; owned by the
//! Resource Manager for the process lifetime; must be safe for concurrent
//! use.

mod http;
mod postgres;

pub use http::{HttpSource, HttpSourceConfig};
pub use postgres::{PostgresSource, PostgresSourceConfig};

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::instrumentation::Tracer;
use crate::kind_registry::{strict_decode, KindRegistry, RawBody};

/// A live, initialized source handle.
pub trait Source: Send + Sync {
    /// The kind this handle was initialized from, e.g. `"postgres-sql"`.
    fn kind(&self) -> &'static str;

    /// Narrow to a concrete backend-typed accessor (§3: "zero or more
    /// backend-typed accessors"). Tools downcast via this to reach e.g.
    /// the underlying `PgPool`.
    fn as_any(&self) -> &dyn Any;
}

/// Immutable, YAML-decoded source configuration. Consumed exactly once by
/// the Resource Manager during startup.
#[async_trait]
pub trait SourceConfig: Send + Sync {
    /// The kind tag, matching the registry key this config was decoded
    /// under.
    fn kind(&self) -> &'static str;

    /// A JSON summary of this config, for the `/api/source` listing
    /// endpoints. Rendered before redaction (§4.7, §8 "Redaction") — the
    /// caller is responsible for redacting sensitive keys.
    fn summary(&self) -> serde_json::Value;

    /// Establish the live connection/session handle.
    async fn initialize(&self, tracer: &Tracer) -> Result<Arc<dyn Source>>;
}

/// Register the reference source kinds this repo ships (`postgres-sql`,
/// `http`) into a fresh registry. Called once from `main` (§9 "explicit
/// builder", replacing init-time side effects).
#[must_use]
pub fn build_registry() -> KindRegistry<dyn SourceConfig> {
    let mut registry = KindRegistry::new();
    registry.register("postgres-sql", decode_postgres);
    registry.register("http", decode_http);
    registry
}

fn decode_postgres(body: RawBody) -> Result<Box<dyn SourceConfig>> {
    let cfg: PostgresSourceConfig = strict_decode(body)?;
    Ok(Box::new(cfg))
}

fn decode_http(body: RawBody) -> Result<Box<dyn SourceConfig>> {
    let cfg: HttpSourceConfig = strict_decode(body)?;
    Ok(Box::new(cfg))
}
