//! MCP Dispatcher (spec §4.8, §2 C10): JSON-RPC 2.0 over `POST /mcp`,
//! single message per request. MCP has no auth model in this spec — every
//! `tools/call` dispatch runs with an empty verified-claims set (§4.8).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::error::rpc_codes;
use crate::instrumentation::Instrumentation;
use crate::manager::ResourceManager;
use crate::param::ClaimsByService;

/// A JSON-RPC 2.0 request envelope, loosely typed — unknown/extra fields
/// are accepted since MCP clients vary in what they send.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Must be `"2.0"` (§4.8 "Validates `jsonrpc == \"2.0\"`").
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// The RPC method name.
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters, method-specific shape.
    #[serde(default)]
    pub params: Option<Value>,
    /// Request id. Absent/null means a notification — no response is sent.
    #[serde(default)]
    pub id: Option<Value>,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

const SERVER_NAME: &str = "toolbox-gateway";

/// Dispatch one JSON-RPC request. Returns `None` for a notification
/// (`id` absent/null) per §4.8 — the transport must not write a body.
pub async fn dispatch(
    manager: &Arc<ResourceManager>,
    instrumentation: &Instrumentation,
    body: &[u8],
) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return Some(RpcResponse::err(Value::Null, rpc_codes::PARSE_ERROR, e.to_string())),
    };

    let id = request.id.clone().unwrap_or(Value::Null);
    let is_notification = matches!(request.id, None | Some(Value::Null));

    if request.jsonrpc.as_deref() != Some("2.0") {
        let response = RpcResponse::err(id, rpc_codes::INVALID_REQUEST, "`jsonrpc` must be \"2.0\"");
        return if is_notification { None } else { Some(response) };
    }

    let Some(method) = request.method.as_deref() else {
        let response = RpcResponse::err(id, rpc_codes::INVALID_REQUEST, "missing `method`");
        return if is_notification { None } else { Some(response) };
    };

    let response = match method {
        "initialize" => RpcResponse::ok(id, handle_initialize()),
        "notifications/initialized" | "notifications/cancelled" => {
            return None;
        }
        "tools/list" => RpcResponse::ok(id, handle_tools_list(manager)),
        "tools/call" => match handle_tools_call(manager, instrumentation, request.params.as_ref()).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err((code, message)) => RpcResponse::err(id, code, message),
        },
        other => RpcResponse::err(
            id,
            rpc_codes::METHOD_NOT_FOUND,
            format!("unknown method `{other}`"),
        ),
    };

    if is_notification {
        None
    } else {
        Some(response)
    }
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": { "listChanged": false },
        },
    })
}

fn handle_tools_list(manager: &Arc<ResourceManager>) -> Value {
    let Some(toolset) = manager.get_toolset("") else {
        return json!({ "tools": [] });
    };
    let tools: Vec<&crate::tool::McpManifest> = toolset.tools().iter().map(|t| t.mcp_manifest()).collect();
    json!({ "tools": tools })
}

async fn handle_tools_call(
    manager: &Arc<ResourceManager>,
    instrumentation: &Instrumentation,
    params: Option<&Value>,
) -> Result<Value, (i32, String)> {
    let params = params.ok_or((rpc_codes::INVALID_PARAMS, "missing `params`".to_string()))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or((rpc_codes::INVALID_PARAMS, "missing `params.name`".to_string()))?;
    let arguments = params
        .get("arguments")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let Some(tool) = manager.get_tool(name) else {
        return Err((rpc_codes::INVALID_PARAMS, format!("unknown tool `{name}`")));
    };

    // MCP has no auth model in this spec: claims are always empty, so
    // `authRequired` tools and auth-bound parameters are unreachable via
    // MCP and will fail authorization/parsing, matching §4.8.
    let claims = ClaimsByService::new();
    let ctx = RequestContext::new(claims, None, tracing::Span::current());

    let verified = ctx.verified_service_names();
    if !tool.authorized(&verified) {
        instrumentation.tool_invoke(name, "error");
        return Err((rpc_codes::INVALID_REQUEST, format!("tool `{name}` requires authorization")));
    }

    let parsed = tool
        .parse_params(&arguments, ctx.claims())
        .map_err(|e| (rpc_codes::INVALID_PARAMS, e.to_string()))?;
    let template_values = tool
        .parse_template_params(&arguments)
        .map_err(|e| (rpc_codes::INVALID_PARAMS, e.to_string()))?;

    instrumentation.begin_active_operation();
    let result = tool.invoke(&ctx, parsed, template_values).await;
    instrumentation.end_active_operation();

    match result {
        Ok(value) => {
            instrumentation.tool_invoke(name, "success");
            let text = serde_json::to_string(&value).unwrap_or_default();
            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false,
            }))
        }
        Err(e) => {
            instrumentation.tool_invoke(name, "error");
            Ok(json!({
                "content": [{ "type": "text", "text": e.to_string() }],
                "isError": true,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::instrumentation::{Instrumentation, Tracer};

    async fn empty_manager() -> Arc<ResourceManager> {
        Arc::new(ResourceManager::initialize(Catalog::default(), &Tracer::default()).await.unwrap())
    }

    #[tokio::test]
    async fn notification_with_null_id_yields_no_response() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(dispatch(&manager, &instrumentation, body).await.is_none());
    }

    #[tokio::test]
    async fn initialize_returns_server_info() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["result"]["serverInfo"]["name"], "toolbox-gateway");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"ghost"}"#;
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], rpc_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_call_on_unknown_tool_mentions_its_name() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"ghost","arguments":{}}}"#;
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], rpc_codes::INVALID_PARAMS);
        assert!(json["error"]["message"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn invalid_envelope_missing_jsonrpc_field() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"id":1,"method":"initialize"}"#;
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], rpc_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = b"not json";
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], rpc_codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn tools_list_on_empty_catalog_is_empty_array() {
        let manager = empty_manager().await;
        let instrumentation = Instrumentation::new();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let response = dispatch(&manager, &instrumentation, body).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["result"]["tools"].as_array().unwrap().len(), 0);
    }
}
