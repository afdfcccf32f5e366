//! `oidc` reference auth service — JWT signature validation and JWKS
//! caching, grounded in the same verification flow as a standalone OIDC
//! ID-token verifier.
//!
//! # Verification flow
//!
//! 1. Decode the JWT header (no verification) to extract `kid` and `alg`.
//! 2. Fetch the issuer's JWKS (cached for 1 hour; refreshed once on
//!    unknown `kid`).
//! 3. Verify the JWT signature and standard claims (`exp`, `iat`, `aud`,
//!    `iss`).
//! 4. Return every claim in the token as the service's claims map — which
//!    claim the catalog actually binds is a per-parameter decision
//!    (`claimField`), not this verifier's concern.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::{AuthService, AuthServiceConfig};

/// Catalog shape for an `oidc` auth service document.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct OidcAuthServiceConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Expected `aud` claim values; a token matching any one passes.
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Override for the JWKS endpoint; defaults to OIDC discovery
    /// convention (`<issuer>/.well-known/jwks.json`).
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Replay protection window; tokens older than this are rejected.
    #[serde(default = "default_max_token_age_secs")]
    pub max_token_age_secs: u64,
}

fn default_max_token_age_secs() -> u64 {
    300
}

#[async_trait]
impl AuthServiceConfig for OidcAuthServiceConfig {
    fn kind(&self) -> &'static str {
        "oidc"
    }

    fn summary(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    async fn initialize(&self) -> Result<Arc<dyn AuthService>> {
        Ok(Arc::new(OidcVerifier {
            config: self.clone(),
            jwks_cache: JwksCache::new(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    #[serde(default)]
    aud: Value,
    iat: u64,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// JWKS cache, one entry per issuer, 1-hour TTL.
struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksCache {
    fn new() -> Self {
        Self {
            inner: DashMap::new(),
            http: reqwest::Client::builder()
                .https_only(true)
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            ttl: Duration::from_secs(3600),
        }
    }

    async fn get_or_fetch(&self, issuer: &str, jwks_uri: &str, force_refresh: bool) -> Result<JwkSet> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(issuer) {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(issuer = %issuer, "fetching JWKS from {jwks_uri}");
        let jwks: JwkSet = self
            .http
            .get(jwks_uri)
            .send()
            .await?
            .json()
            .await?;

        self.inner.insert(
            issuer.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        Ok(jwks)
    }
}

/// Live OIDC verifier handle.
pub struct OidcVerifier {
    config: OidcAuthServiceConfig,
    jwks_cache: JwksCache,
}

#[async_trait]
impl AuthService for OidcVerifier {
    fn kind(&self) -> &'static str {
        "oidc"
    }

    async fn verify(&self, bearer_token: &str) -> Result<Map<String, Value>> {
        let header = jsonwebtoken::decode_header(bearer_token)
            .map_err(|e| Error::Unauthorized(format!("malformed token: {e}")))?;

        let unverified = extract_unverified_claims(bearer_token)?;

        if unverified.iss != self.config.issuer {
            return Err(Error::Unauthorized(format!(
                "issuer mismatch: expected {}, got {}",
                self.config.issuer, unverified.iss
            )));
        }

        let now_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let iat_ago = now_secs.saturating_sub(unverified.iat);
        if iat_ago > self.config.max_token_age_secs {
            return Err(Error::Unauthorized(format!(
                "token too old (issued {iat_ago}s ago, max {}s)",
                self.config.max_token_age_secs
            )));
        }

        let kid = header
            .kid
            .clone()
            .ok_or_else(|| Error::Unauthorized("token missing `kid`".into()))?;

        let jwks_uri = self
            .config
            .jwks_uri
            .clone()
            .unwrap_or_else(|| default_jwks_uri(&self.config.issuer));

        let decoding_key = self.find_decoding_key(&kid, &jwks_uri).await?;

        let mut validation = build_validation(&header);
        validation.validate_aud = false;

        let token_data = jsonwebtoken::decode::<IdTokenClaims>(bearer_token, &decoding_key, &validation)
            .map_err(|e| Error::Unauthorized(format!("signature verification failed: {e}")))?;
        let claims = token_data.claims;

        if !self.config.audiences.is_empty() {
            check_audience(&claims.aud, &self.config.audiences)?;
        }

        let mut out = claims.rest;
        out.insert("iss".to_string(), Value::String(claims.iss));
        Ok(out)
    }
}

impl OidcVerifier {
    async fn find_decoding_key(&self, kid: &str, jwks_uri: &str) -> Result<DecodingKey> {
        let jwks = self
            .jwks_cache
            .get_or_fetch(&self.config.issuer, jwks_uri, false)
            .await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        debug!(kid = %kid, "key not found in cached JWKS, refreshing");
        let jwks = self
            .jwks_cache
            .get_or_fetch(&self.config.issuer, jwks_uri, true)
            .await?;
        find_key_in_jwks(&jwks, kid)
            .ok_or_else(|| Error::Unauthorized(format!("unknown key id `{kid}`")))
    }
}

fn extract_unverified_claims(token: &str) -> Result<IdTokenClaims> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return Err(Error::Unauthorized("malformed token".into()));
    }
    let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1])
        .map_err(|_| Error::Unauthorized("malformed token".into()))?;
    serde_json::from_slice(&payload).map_err(|_| Error::Unauthorized("malformed claims".into()))
}

fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        let jwk_kid = jwk.common.key_id.as_deref().unwrap_or("");
        if jwk_kid != kid {
            continue;
        }
        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

fn build_validation(header: &Header) -> Validation {
    let alg = match header.alg {
        Algorithm::RS256 => Algorithm::RS256,
        Algorithm::RS384 => Algorithm::RS384,
        Algorithm::RS512 => Algorithm::RS512,
        Algorithm::ES256 => Algorithm::ES256,
        Algorithm::ES384 => Algorithm::ES384,
        other => {
            tracing::warn!(alg = ?other, "unsupported JWT algorithm, defaulting to RS256");
            Algorithm::RS256
        }
    };
    let mut v = Validation::new(alg);
    v.leeway = 60;
    v
}

fn check_audience(aud_claim: &Value, expected: &[String]) -> Result<()> {
    let matches = match aud_claim {
        Value::String(s) => expected.iter().any(|e| e == s),
        Value::Array(arr) => arr
            .iter()
            .any(|v| v.as_str().is_some_and(|s| expected.iter().any(|e| e == s))),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(Error::Unauthorized("audience mismatch".into()))
    }
}

fn default_jwks_uri(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_jwks_uri_appends_well_known() {
        assert_eq!(
            default_jwks_uri("https://accounts.google.com"),
            "https://accounts.google.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn default_jwks_uri_handles_trailing_slash() {
        assert_eq!(
            default_jwks_uri("https://accounts.google.com/"),
            "https://accounts.google.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn check_audience_accepts_string_match() {
        let aud = serde_json::json!("my-client-id");
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_ok());
    }

    #[test]
    fn check_audience_accepts_array_member_match() {
        let aud = serde_json::json!(["other-client", "my-client-id"]);
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_ok());
    }

    #[test]
    fn check_audience_rejects_no_match() {
        let aud = serde_json::json!("wrong-client");
        assert!(check_audience(&aud, &["my-client-id".to_string()]).is_err());
    }

    #[test]
    fn extract_unverified_claims_rejects_malformed_token() {
        assert!(extract_unverified_claims("not-a-jwt").is_err());
    }
}
