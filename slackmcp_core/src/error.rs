use std::time::Duration;

use serde_json::json;

/// Crate-wide error type. Handlers surface these to the MCP client as
/// JSON-RPC errors; the limiter inspects `RateLimited` to drive retries.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Slack API error on {endpoint}: {error}")]
    SlackApi { endpoint: String, error: String },

    #[error("Slack rate limited (retry after {0:?})")]
    RateLimited(Duration),

    #[error("channels cache refresh was rate-limited")]
    RefreshRateLimited,

    #[error("Slack users sync is not ready yet: name-based lookups (@handle resolution, IM display names) are unavailable until the users cache is populated. ID-based operations still work; please retry shortly")]
    UsersNotReady,

    #[error("Slack channels sync is not ready yet: conversations can only be requested by channel ID, not by #name, until the channels cache is populated. Please retry shortly")]
    ChannelsNotReady,

    #[error("{0} not found")]
    NotFound(String),

    #[error("operation not supported by this token type: {0}")]
    UnsupportedByToken(String),

    #[error("{0}")]
    PolicyDenied(String),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ServerError::InvalidInput(_) => "invalid_input",
            ServerError::InvalidParams(_) => "invalid_params",
            ServerError::Authentication(_) => "auth_failed",
            ServerError::SlackApi { .. } => "upstream_error",
            ServerError::HttpRequest(_) => "upstream_error",
            ServerError::RateLimited(_) => "rate_limited",
            ServerError::RefreshRateLimited => "rate_limited",
            ServerError::UsersNotReady | ServerError::ChannelsNotReady => "not_ready",
            ServerError::NotFound(_) => "not_found",
            ServerError::ResourceNotFound => "not_found",
            ServerError::ToolNotFound => "tool_not_found",
            ServerError::MethodNotFound => "method_not_found",
            ServerError::ParseError => "parse_error",
            ServerError::UnsupportedByToken(_) => "unsupported_token",
            ServerError::PolicyDenied(_) => "policy_denied",
            ServerError::ResourceLimit(_) => "resource_limit",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ServerError::ResourceNotFound => (-32602, "Resource not found".to_string()),
            ServerError::ToolNotFound => (-32602, "Tool not found".to_string()),
            ServerError::InvalidParams(msg) => (-32602, msg.clone()),
            ServerError::InvalidInput(msg) => (-32602, msg.clone()),
            ServerError::MethodNotFound => (-32601, "Method not found".to_string()),
            ServerError::ParseError => (-32700, "Parse error".to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
        })
    }

    /// Retry classification for Slack calls: rate-limit errors carry the
    /// server-provided backoff, anything else is non-retryable.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServerError::RateLimited(d) => Some(*d),
            _ => None,
        }
    }
}
