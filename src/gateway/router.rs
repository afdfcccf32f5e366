//! HTTP Router (spec §2 C9, §4.7): the REST API surface plus the shared
//! middleware chain (recover, request-logger/trace-span, auth header
//! extraction) that both it and the MCP dispatcher (`super::mcp`) sit
//! behind.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::Error;
use crate::instrumentation::Instrumentation;
use crate::manager::ResourceManager;
use crate::param::ClaimsByService;

use super::redact::redacted;

/// Shared application state, handed to every handler via axum's `State`
/// extractor (§9 "Trace/metric plumbing": never smuggled through globals).
pub struct AppState {
    /// The fully initialized resource graph.
    pub manager: Arc<ResourceManager>,
    /// Tracer + counters + gauge (§2 C11).
    pub instrumentation: Instrumentation,
    /// In-flight request tracker for graceful drain on shutdown
    /// (`gateway::server::Gateway::run`).
    pub inflight: Arc<tokio::sync::Semaphore>,
}

/// Per-request claims extracted by [`auth_extract_middleware`], attached as
/// a request extension so downstream handlers don't re-verify headers.
#[derive(Clone, Default)]
struct ExtractedAuth {
    claims: ClaimsByService,
    access_token: Option<String>,
}

/// Assemble the router: two sub-routers (REST API, MCP) behind a shared
/// middleware chain (§4.7): recover (`CatchPanicLayer`), request logging +
/// trace span start (`TraceLayer`), then auth header extraction innermost,
/// closest to the handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler))
        .route("/api/toolset/", get(toolset_root_handler))
        .route("/api/toolset", get(toolset_root_handler))
        .route("/api/toolset/{name}", get(toolset_handler))
        .route("/api/toolsets", get(toolsets_list_handler))
        .route("/api/tool/{name}/invoke", post(invoke_handler))
        .route("/api/tool/{name}", get(tool_handler))
        .route("/api/tools", get(tools_list_handler))
        .route("/api/source/{name}", get(source_handler))
        .route("/api/sources", get(sources_list_handler))
        .route("/api/authService/{name}", get(auth_service_handler))
        .route("/api/authServices", get(auth_services_list_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), track_inflight))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth_extract_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Hold one in-flight permit for the duration of the request, so shutdown
/// can drain by acquiring every permit back (§5 "Cancellation": "Cancelled
/// invocations must release any allocated connection back to the pool").
async fn track_inflight(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Ok(_permit) = state.inflight.clone().acquire_owned().await else {
        return error_response(503, "Service Unavailable", "server is shutting down");
    };
    next.run(request).await
}

/// Extract every `<serviceName>_token` header (§4.5, §6.3), verify each
/// against its named auth service, and attach the resulting claims map as
/// a request extension.
async fn auth_extract_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let mut header_tokens = HashMap::new();
    let mut access_token = None;
    for (name, value) in request.headers() {
        let Ok(value) = value.to_str() else { continue };
        if name.as_str().eq_ignore_ascii_case("authorization") {
            access_token = value.strip_prefix("Bearer ").map(str::to_string);
            continue;
        }
        if name.as_str().ends_with("_token") {
            header_tokens.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let claims = state.manager.verify_headers(&header_tokens).await;
    request.extensions_mut().insert(ExtractedAuth { claims, access_token });
    next.run(request).await
}

fn error_response(status: u16, status_name: &str, message: impl Into<String>) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(json!({ "status": status_name, "error": message.into() }))).into_response()
}

fn error_from(err: &Error) -> Response {
    error_response(err.to_http_status(), err.status_name(), err.to_string())
}

fn require_json_content_type(headers: &HeaderMap) -> Result<(), Response> {
    let ok = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if ok {
        Ok(())
    } else {
        Err(error_response(415, "Unsupported Media Type", "Content-Type must be application/json"))
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let _span = state.instrumentation.tracer().span("server", "health").entered();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn toolset_root_handler(State(state): State<Arc<AppState>>) -> Response {
    respond_with_toolset(&state, "")
}

async fn toolset_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    respond_with_toolset(&state, &name)
}

fn respond_with_toolset(state: &Arc<AppState>, name: &str) -> Response {
    let _span = state.instrumentation.tracer().span("toolset", "get").entered();
    match state.manager.get_toolset(name) {
        Some(toolset) => {
            state.instrumentation.toolset_get(name, "success");
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "application/json")],
                toolset.manifest_bytes().to_vec(),
            )
                .into_response()
        }
        None => {
            state.instrumentation.toolset_get(name, "error");
            error_from(&Error::UnknownResource(format!("toolset `{name}`")))
        }
    }
}

async fn toolsets_list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<Value> = state
        .manager
        .toolsets_map()
        .values()
        .map(|t| json!({ "name": t.name(), "toolCount": t.tools().len() }))
        .collect();
    Json(json!({ "toolsets": list }))
}

async fn tools_list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<Value> = state
        .manager
        .tool_summaries()
        .iter()
        .map(|(name, summary)| {
            redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))
        })
        .collect();
    Json(json!({ "tools": list }))
}

async fn tool_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let _span = state.instrumentation.tracer().span("tool", "get").entered();
    match state.manager.tool_summaries().get(&name) {
        Some(summary) => {
            state.instrumentation.tool_get(&name, "success");
            Json(redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))).into_response()
        }
        None => {
            state.instrumentation.tool_get(&name, "error");
            error_from(&Error::UnknownResource(format!("tool `{name}`")))
        }
    }
}

async fn sources_list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<Value> = state
        .manager
        .source_summaries()
        .iter()
        .map(|(name, summary)| {
            redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))
        })
        .collect();
    Json(json!({ "sources": list }))
}

async fn source_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.manager.source_summaries().get(&name) {
        Some(summary) => Json(redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))).into_response(),
        None => error_from(&Error::UnknownResource(format!("source `{name}`"))),
    }
}

async fn auth_services_list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<Value> = state
        .manager
        .auth_service_summaries()
        .iter()
        .map(|(name, summary)| {
            redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))
        })
        .collect();
    Json(json!({ "authServices": list }))
}

async fn auth_service_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.manager.auth_service_summaries().get(&name) {
        Some(summary) => Json(redacted(json!({ "name": name, "kind": summary.kind, "config": summary.config }))).into_response(),
        None => error_from(&Error::UnknownResource(format!("auth service `{name}`"))),
    }
}

/// `POST /api/tool/{name}/invoke` (§4.7): parse → authorize → invoke,
/// strictly ordered (§5 "Ordering guarantees").
async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
) -> Response {
    let _span = state.instrumentation.tracer().span("tool", "invoke").entered();

    if let Err(resp) = require_json_content_type(&headers) {
        return resp;
    }

    let Some(tool) = state.manager.get_tool(&name) else {
        state.instrumentation.tool_invoke(&name, "error");
        return error_from(&Error::UnknownResource(format!("tool `{name}`")));
    };

    let auth = request
        .extensions()
        .get::<ExtractedAuth>()
        .cloned()
        .unwrap_or_default();

    let verified = auth.claims.keys().cloned().collect();
    if !tool.auth_required().is_empty() && !tool.authorized(&verified) {
        state.instrumentation.tool_invoke(&name, "error");
        return if auth.claims.is_empty() {
            error_response(401, "Unauthorized", format!("tool `{name}` requires a verified auth token"))
        } else {
            error_response(403, "Forbidden", format!("tool `{name}`: no matching auth service verified"))
        };
    }

    if tool.requires_client_authorization() && auth.access_token.is_none() {
        state.instrumentation.tool_invoke(&name, "error");
        return error_response(401, "Unauthorized", format!("tool `{name}` requires a client access token"));
    }

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            state.instrumentation.tool_invoke(&name, "error");
            return error_response(400, "Bad Request", format!("failed to read request body: {e}"));
        }
    };
    let raw: serde_json::Map<String, Value> = if body.is_empty() {
        serde_json::Map::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                state.instrumentation.tool_invoke(&name, "error");
                return error_response(400, "Bad Request", "request body must be a JSON object");
            }
            Err(e) => {
                state.instrumentation.tool_invoke(&name, "error");
                return error_response(400, "Bad Request", format!("invalid JSON body: {e}"));
            }
        }
    };

    let params = match tool.parse_params(&raw, &auth.claims) {
        Ok(p) => p,
        Err(e) => {
            state.instrumentation.tool_invoke(&name, "error");
            return error_from(&e);
        }
    };

    let template_values = match tool.parse_template_params(&raw) {
        Ok(v) => v,
        Err(e) => {
            state.instrumentation.tool_invoke(&name, "error");
            return error_from(&e);
        }
    };

    let ctx = RequestContext::new(auth.claims, auth.access_token, tracing::Span::current());

    state.instrumentation.begin_active_operation();
    let result = tool.invoke(&ctx, params, template_values).await;
    state.instrumentation.end_active_operation();

    match result {
        Ok(value) => {
            state.instrumentation.tool_invoke(&name, "success");
            match serde_json::to_string(&value) {
                Ok(text) => Json(json!({ "result": text })).into_response(),
                Err(e) => {
                    state.instrumentation.tool_invoke(&name, "error");
                    error_from(&Error::Internal(format!("failed to encode tool result: {e}")))
                }
            }
        }
        Err(e) => {
            debug!(tool = %name, error = %e, "tool invocation failed");
            state.instrumentation.tool_invoke(&name, "error");
            error_from(&e)
        }
    }
}

/// `POST /mcp` (§4.8). MCP requests use their own JSON-RPC error envelope,
/// never the REST `{status, error}` shape.
async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _span = state.instrumentation.tracer().span("mcp", "dispatch").entered();

    if let Err(resp) = require_json_content_type(&headers) {
        return resp;
    }

    match super::mcp::dispatch(&state.manager, &state.instrumentation, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::instrumentation::Tracer;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let manager = ResourceManager::initialize(Catalog::default(), &Tracer::default()).await.unwrap();
        Arc::new(AppState {
            manager: Arc::new(manager),
            instrumentation: Instrumentation::new(),
            inflight: Arc::new(tokio::sync::Semaphore::new(100)),
        })
    }

    #[tokio::test]
    async fn health_returns_200() {
        let state = test_state().await;
        let app = create_router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_tool_invoke_is_404() {
        let state = test_state().await;
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tool/ghost/invoke")
                    .header(CONTENT_TYPE, "application/json")
                    .body(axum::body::Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invoke_without_json_content_type_is_415() {
        let state = test_state().await;
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tool/ghost/invoke")
                    .body(axum::body::Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn empty_toolset_manifest_is_idempotent() {
        let state = test_state().await;
        let app = create_router(state);
        let first = app
            .clone()
            .oneshot(Request::builder().uri("/api/toolset/").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let second = app
            .oneshot(Request::builder().uri("/api/toolset/").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first_body, second_body);
    }

    #[tokio::test]
    async fn unknown_toolset_is_404() {
        let state = test_state().await;
        let app = create_router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/toolset/ghost").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_initialize_round_trips() {
        let state = test_state().await;
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header(CONTENT_TYPE, "application/json")
                    .body(axum::body::Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["result"]["serverInfo"]["name"], "toolbox-gateway");
    }
}
