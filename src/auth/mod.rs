//! Auth Service (spec §3, §4.5): verifies bearer tokens extracted from
//! request headers and extracts claim sets keyed by service name.

mod oidc;

pub use oidc::{OidcAuthServiceConfig, OidcVerifier};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::kind_registry::{strict_decode, KindRegistry, RawBody};

/// A live, initialized auth service handle.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// The kind this handle was initialized from, e.g. `"oidc"`.
    fn kind(&self) -> &'static str;

    /// Verify a bearer token and return its claims as a JSON object, or a
    /// verification error. Opaque to the caller (§3: "delegated to e.g.
    /// OIDC ID-token verification").
    async fn verify(&self, bearer_token: &str) -> Result<Map<String, Value>>;
}

/// Immutable, YAML-decoded auth service configuration.
#[async_trait]
pub trait AuthServiceConfig: Send + Sync {
    /// The kind tag.
    fn kind(&self) -> &'static str;

    /// A JSON summary of this config, for the `/api/authService` listing
    /// endpoints (§4.7, §8 "Redaction").
    fn summary(&self) -> serde_json::Value;

    /// Build the live verifier.
    async fn initialize(&self) -> Result<Arc<dyn AuthService>>;
}

/// Register the reference auth service kind this repo ships (`oidc`).
#[must_use]
pub fn build_registry() -> KindRegistry<dyn AuthServiceConfig> {
    let mut registry = KindRegistry::new();
    registry.register("oidc", decode_oidc);
    registry
}

fn decode_oidc(body: RawBody) -> Result<Box<dyn AuthServiceConfig>> {
    let cfg: OidcAuthServiceConfig = strict_decode(body)?;
    Ok(Box::new(cfg))
}
