//! Catalog-to-response integration tests: load a multi-document YAML
//! catalog, initialize the resource graph, and drive the full router
//! and MCP dispatcher over it (spec §8 end-to-end scenarios).

use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};

use toolbox_gateway::catalog::{self, Registries};
use toolbox_gateway::gateway::{create_router, AppState};
use toolbox_gateway::instrumentation::{Instrumentation, Tracer};
use toolbox_gateway::manager::ResourceManager;
use toolbox_gateway::{auth, source, tool};

const CATALOG: &[u8] = br#"
kind: sources
name: api
type: http
baseUrl: https://example.invalid
---
kind: tools
name: greet
type: http
source: api
description: says hello
path: /greet
parameters:
  - name: who
    type: string
    required: true
---
kind: tools
name: secret
type: http
source: api
description: needs auth
path: /secret
authRequired: [my-google-auth]
---
kind: authServices
name: my-google-auth
type: oidc
issuer: https://accounts.google.com
audiences: [client-id]
---
kind: tools
name: by-table
type: http
source: api
description: reads a templated path
path: /rows/{{.table}}
templateParameters:
  - name: table
    description: table name, spliced into the path
---
kind: toolsets
name: s1
toolNames: [greet]
"#;

async fn build_app() -> axum::Router {
    let sources = source::build_registry();
    let auth_services = auth::build_registry();
    let tools = tool::build_registry();
    let registries = Registries {
        sources: &sources,
        auth_services: &auth_services,
        tools: &tools,
    };
    let catalog = catalog::load(CATALOG, &registries).unwrap();
    let manager = ResourceManager::initialize(catalog, &Tracer::default())
        .await
        .unwrap();
    let state = Arc::new(AppState {
        manager: Arc::new(manager),
        instrumentation: Instrumentation::new(),
        inflight: Arc::new(tokio::sync::Semaphore::new(100)),
    });
    create_router(state)
}

#[tokio::test]
async fn named_toolset_lists_only_its_own_tools() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/toolset/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["greet"]);
}

#[tokio::test]
async fn root_toolset_lists_every_tool() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/toolset/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["tools"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn tool_requiring_auth_without_token_is_unauthorized() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tool/secret/invoke")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_required_parameter_is_bad_request() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tool/greet/invoke")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn source_listing_redacts_nothing_sensitive_for_http_base_url() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/source/api")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["config"]["baseUrl"], "https://example.invalid");
}

#[tokio::test]
async fn mcp_tools_list_matches_synthetic_all_toolset() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["result"]["tools"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn mcp_tools_call_on_unknown_tool_mentions_name_in_error() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"ghost","arguments":{}}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], -32602);
    assert!(json["error"]["message"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn template_only_parameter_missing_from_body_is_bad_request() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tool/by-table/invoke")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("table"));
}

#[tokio::test]
async fn template_only_parameter_present_in_body_clears_template_substitution() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tool/by-table/invoke")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"table":"orders"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    // The template value resolves and the request proceeds past
    // substitution to the (unreachable) backend, which fails with a 500 —
    // never the 400 `BadTemplateParam` a missing input path would produce.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn strict_decoding_rejects_unknown_field_with_offending_name() {
    let sources = source::build_registry();
    let auth_services = auth::build_registry();
    let tools = tool::build_registry();
    let registries = Registries {
        sources: &sources,
        auth_services: &auth_services,
        tools: &tools,
    };
    let yaml = b"kind: sources\nname: api\ntype: http\nbaseUrl: https://example.invalid\nbogusField: 1\n";
    let err = catalog::load(yaml, &registries).unwrap_err();
    assert!(err.to_string().contains("bogusField") || err.to_string().contains("api"));
}
