//! Request context (spec §3 "Request context", §5): the per-request object
//! threaded through every pipeline stage, carrying verified claims, the
//! caller's opaque access token, the active trace span, and a cancellation
//! signal.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::param::ClaimsByService;

/// Per-request state, constructed once per inbound request and passed by
/// reference through header parse → claim verify → body parse → auth check
/// → param parse → invoke → respond (§5 "Ordering guarantees").
#[derive(Clone)]
pub struct RequestContext {
    claims: ClaimsByService,
    access_token: Option<String>,
    span: Span,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Build a fresh context. `access_token` is the raw bearer value seen on
    /// the request, if any — used by `RequiresClientAuthorization` tools
    /// (§9 Open Questions), not for claim verification.
    #[must_use]
    pub fn new(claims: ClaimsByService, access_token: Option<String>, span: Span) -> Self {
        Self {
            claims,
            access_token,
            span,
            cancellation: CancellationToken::new(),
        }
    }

    /// Claims verified for this request, keyed by auth service name.
    #[must_use]
    pub fn claims(&self) -> &ClaimsByService {
        &self.claims
    }

    /// Names of services whose tokens verified on this request — the set
    /// `Tool::authorized` checks `authRequired` against (§4.5, §4.6).
    #[must_use]
    pub fn verified_service_names(&self) -> std::collections::HashSet<String> {
        self.claims.keys().cloned().collect()
    }

    /// The caller's bearer token, if a recognized auth header was present.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// The span this request's work should be recorded under.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// This request's cancellation signal. In-flight backend I/O must
    /// observe it and abort promptly (§5 "Cancellation").
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel this request — called when the client disconnects or a
    /// deadline fires.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Race `fut` against cancellation, mapping a cancellation to
    /// `Error::Cancelled` so backend drivers never have to special-case it.
    pub async fn run_cancellable<F, T>(&self, fut: F) -> crate::error::Result<T>
    where
        F: std::future::Future<Output = crate::error::Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(crate::error::Error::Cancelled),
            result = fut => result,
        }
    }

    /// Run `fut` with an optional deadline layered on top of cancellation.
    pub async fn run_with_deadline<F, T>(&self, deadline: Option<Duration>, fut: F) -> crate::error::Result<T>
    where
        F: std::future::Future<Output = crate::error::Result<T>>,
    {
        match deadline {
            None => self.run_cancellable(fut).await,
            Some(d) => {
                tokio::select! {
                    biased;
                    () = self.cancellation.cancelled() => Err(crate::error::Error::Cancelled),
                    () = tokio::time::sleep(d) => Err(crate::error::Error::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_context_aborts_pending_future() {
        let ctx = RequestContext::new(ClaimsByService::new(), None, Span::none());
        ctx.cancel();
        let result = ctx
            .run_cancellable(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(42)
            })
            .await;
        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }

    #[tokio::test]
    async fn uncancelled_context_returns_future_result() {
        let ctx = RequestContext::new(ClaimsByService::new(), None, Span::none());
        let result = ctx.run_cancellable(async { Ok::<_, crate::error::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn verified_service_names_reflects_claim_keys() {
        let mut claims = ClaimsByService::new();
        claims.insert("svc-a".into(), serde_json::Map::new());
        let ctx = RequestContext::new(claims, None, Span::none());
        assert!(ctx.verified_service_names().contains("svc-a"));
    }
}
