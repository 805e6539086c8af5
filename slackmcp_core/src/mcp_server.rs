//! MCP server: request dispatch over the tool and resource surface.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, InitializeRequestParam, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, ProtocolVersion,
    ReadResourceRequestParam, ResourceContents, ServerCapabilities,
};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::auth::{self, AuthContext, McpTokenStore};
use crate::error::ServerError;
use crate::handlers::attachments::AttachmentsHandler;
use crate::handlers::channels::ChannelsHandler;
use crate::handlers::conversations::ConversationsHandler;
use crate::handlers::lists::ListsHandler;
use crate::handlers::reactions::ReactionsHandler;
use crate::handlers::unreads::UnreadsHandler;
use crate::handlers::usergroups::UsergroupsHandler;
use crate::handlers::users::UsersHandler;
use crate::provider::Provider;
use crate::resources::ResourcesHandler;
use crate::tools;

pub struct McpServer {
    provider: Arc<Provider>,
    token_store: Arc<McpTokenStore>,
    conversations: ConversationsHandler,
    unreads: UnreadsHandler,
    channels: ChannelsHandler,
    reactions: ReactionsHandler,
    attachments: AttachmentsHandler,
    users: UsersHandler,
    usergroups: UsergroupsHandler,
    lists: ListsHandler,
    resources: ResourcesHandler,
}

impl McpServer {
    pub fn new(provider: Arc<Provider>, token_store: Arc<McpTokenStore>) -> Self {
        Self {
            conversations: ConversationsHandler::new(provider.clone()),
            unreads: UnreadsHandler::new(provider.clone()),
            channels: ChannelsHandler::new(provider.clone()),
            reactions: ReactionsHandler::new(provider.clone()),
            attachments: AttachmentsHandler::new(provider.clone()),
            users: UsersHandler::new(provider.clone()),
            usergroups: UsergroupsHandler::new(provider.clone()),
            lists: ListsHandler::new(provider.clone()),
            resources: ResourcesHandler::new(provider.clone()),
            token_store,
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn token_store(&self) -> Arc<McpTokenStore> {
        self.token_store.clone()
    }

    pub async fn handle_initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ServerError> {
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                resources: Some(Default::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: "slackmcp-server".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Slack workspace access: conversation history, threads, search, unread discovery, \
                 channel/user directories, and (when enabled) posting, reactions and attachments. \
                 Tool output is CSV; pass the cursor column back verbatim to fetch the next page."
                    .to_string(),
            ),
        })
    }

    pub async fn handle_list_tools(&self) -> Result<ListToolsResult, ServerError> {
        let enabled = tools::enabled_tools_from_env();
        let registered = tools::registered_tools(&enabled);
        Ok(ListToolsResult {
            tools: tools::tool_definitions(&registered),
            next_cursor: None,
        })
    }

    pub async fn handle_call_tool(
        &self,
        auth: &AuthContext,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        auth::is_authenticated(auth, self.provider.transport())?;

        let enabled = tools::enabled_tools_from_env();
        let registered = tools::registered_tools(&enabled);
        let name: &str = request.name.as_ref();
        if !registered.iter().any(|t| *t == name) {
            return Err(ServerError::ToolNotFound);
        }
        debug!(tool = name, "dispatching tool call");

        match name {
            tools::TOOL_CONVERSATIONS_HISTORY => self.conversations.history(auth, &request).await,
            tools::TOOL_CONVERSATIONS_REPLIES => self.conversations.replies(auth, &request).await,
            tools::TOOL_CONVERSATIONS_SEARCH_MESSAGES => {
                self.conversations.search(auth, &request).await
            }
            tools::TOOL_CONVERSATIONS_ADD_MESSAGE => {
                self.conversations.add_message(auth, &request).await
            }
            tools::TOOL_CONVERSATIONS_EDIT_MESSAGE => {
                self.conversations.edit_message(auth, &request).await
            }
            tools::TOOL_CONVERSATIONS_DELETE_MESSAGE => {
                self.conversations.delete_message(auth, &request).await
            }
            tools::TOOL_CONVERSATIONS_MARK => self.conversations.mark(auth, &request).await,
            tools::TOOL_CONVERSATIONS_UNREADS => self.unreads.unreads(auth, &request).await,
            tools::TOOL_CHANNELS_LIST => self.channels.channels_list(auth, &request).await,
            tools::TOOL_CHANNEL_MEMBERS_LIST => {
                self.channels.channel_members_list(auth, &request).await
            }
            tools::TOOL_REACTIONS_ADD => self.reactions.add(auth, &request).await,
            tools::TOOL_REACTIONS_REMOVE => self.reactions.remove(auth, &request).await,
            tools::TOOL_REACTIONS_GET => self.reactions.get(auth, &request).await,
            tools::TOOL_ATTACHMENT_GET_DATA => self.attachments.get_data(auth, &request).await,
            tools::TOOL_USERS_SEARCH => self.users.users_search(auth, &request).await,
            tools::TOOL_USERGROUPS_LIST => self.usergroups.list(auth, &request).await,
            tools::TOOL_LISTS_ITEMS_LIST => self.lists.items_list(auth, &request).await,
            _ => Err(ServerError::ToolNotFound),
        }
    }

    pub async fn handle_list_resources(
        &self,
        auth: &AuthContext,
    ) -> Result<ListResourcesResult, ServerError> {
        auth::is_authenticated(auth, self.provider.transport())?;
        self.resources.list_resources(auth).await
    }

    pub async fn handle_read_resource(
        &self,
        auth: &AuthContext,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ServerError> {
        auth::is_authenticated(auth, self.provider.transport())?;
        self.resources.read_resource(auth, &request).await
    }
}

/// JSON-RPC message handler shared by every transport.
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Process one JSON-RPC request. Notifications get no response.
    pub async fn handle_request(&self, request: Value, auth: &AuthContext) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(json!({}));

        if method.starts_with("notifications/") {
            return None;
        }

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_initialize(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ServerError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ServerError::SerdeJson(e).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "tools/list" => self
                .server
                .handle_list_tools()
                .await
                .and_then(|r| serde_json::to_value(r).map_err(ServerError::SerdeJson))
                .map_err(|e| e.to_jsonrpc_error()),
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(auth, req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ServerError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ServerError::SerdeJson(e).to_jsonrpc_error()),
            },
            "resources/list" => self
                .server
                .handle_list_resources(auth)
                .await
                .and_then(|r| serde_json::to_value(r).map_err(ServerError::SerdeJson))
                .map_err(|e| e.to_jsonrpc_error()),
            "resources/read" => match serde_json::from_value::<ReadResourceRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_read_resource(auth, req)
                    .await
                    .and_then(|contents| {
                        serde_json::to_value(json!({ "contents": contents }))
                            .map_err(ServerError::SerdeJson)
                    })
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ServerError::SerdeJson(e).to_jsonrpc_error()),
            },
            "prompts/list" => serde_json::to_value(ListPromptsResult {
                prompts: vec![],
                next_cursor: None,
            })
            .map_err(|e| ServerError::SerdeJson(e).to_jsonrpc_error()),
            _ => Err(ServerError::MethodNotFound.to_jsonrpc_error()),
        };

        if let Err(err) = &result {
            error!(method, error = %err, "request failed");
        }

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}
