//! Error types for the tool gateway

use std::io;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors, one variant per transport-independent error kind.
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog parse/validation failure. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// No tool/toolset/source/auth service registered under that name.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Missing required parameter, wrong type, or failed coercion.
    #[error("bad parameter `{name}`: {reason}")]
    BadParam {
        /// Parameter name
        name: String,
        /// Why it failed
        reason: String,
    },

    /// Template parameter value failed identifier validation.
    #[error("bad template parameter `{name}`: {reason}")]
    BadTemplateParam {
        /// Parameter name
        name: String,
        /// Why it failed
        reason: String,
    },

    /// No verified service matches `authRequired`, or an auth-bound
    /// parameter's claim could not be resolved.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Backend call returned an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// Request context was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQL backend error
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// JSON-RPC error, carrying its own code.
    #[error("json-rpc error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
        /// Optional data
        data: Option<serde_json::Value>,
    },

    /// Internal error not covered by another kind.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Construct a JSON-RPC error with an explicit code.
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Map to the HTTP status this error is surfaced as (§7).
    #[must_use]
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::UnknownResource(_) => 404,
            Self::BadParam { .. } | Self::BadTemplateParam { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::Backend(_) | Self::Sql(_) | Self::Http(_) | Self::Internal(_) => 500,
            Self::Cancelled => 499,
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Yaml(_) => 500,
            Self::JsonRpc { .. } => 400,
        }
    }

    /// Map to the JSON-RPC error code this error is surfaced as (§4.8).
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::UnknownResource(_) | Self::BadParam { .. } | Self::BadTemplateParam { .. } => {
                rpc_codes::INVALID_PARAMS
            }
            Self::Unauthorized(_) => rpc_codes::INVALID_REQUEST,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Human status name used in the REST error envelope (§6.2).
    #[must_use]
    pub fn status_name(&self) -> &'static str {
        match self.to_http_status() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            415 => "Unsupported Media Type",
            499 => "Client Closed Request",
            _ => "Internal Server Error",
        }
    }
}

/// Standard JSON-RPC 2.0 error codes (§4.8).
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - not a valid JSON-RPC envelope
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_resource_maps_to_404_and_invalid_params() {
        let err = Error::UnknownResource("ghost".into());
        assert_eq!(err.to_http_status(), 404);
        assert_eq!(err.to_rpc_code(), rpc_codes::INVALID_PARAMS);
    }

    #[test]
    fn bad_param_maps_to_400() {
        let err = Error::BadParam {
            name: "id".into(),
            reason: "wrong type".into(),
        };
        assert_eq!(err.to_http_status(), 400);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = Error::Unauthorized("no token".into());
        assert_eq!(err.to_http_status(), 401);
        assert_eq!(err.to_rpc_code(), rpc_codes::INVALID_REQUEST);
    }
}
