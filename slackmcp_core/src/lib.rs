//! Core library for the Slack MCP server.
//!
//! Exposes a Slack workspace as an MCP tool/resource surface: an
//! authenticated client facade over Slack's public and edge APIs, the
//! on-disk workspace caches with their readiness state machine, the
//! unread-discovery engine, and the tool-registration policy. Transports
//! (stdio/SSE/HTTP) all drive the same JSON-RPC handler.

pub mod auth;
pub mod cache;
pub mod coalesce;
pub mod config;
pub mod csvout;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod mcp_server;
pub mod provider;
pub mod resources;
pub mod search_query;
pub mod slack;
pub mod text;
pub mod tools;
pub mod transport;

pub use error::ServerError;
pub use provider::Provider;
pub use slack::{Credentials, SlackClient, TokenKind};

// Re-export the rmcp model types the binary and downstream users need.
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, ListResourcesResult, ListToolsResult, ReadResourceRequestParam, Resource,
    ResourceContents, ServerCapabilities, Tool,
};
