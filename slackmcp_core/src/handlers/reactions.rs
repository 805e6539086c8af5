//! Emoji reaction tools. Add/remove are write tools subject to the
//! channel allow/deny policy; get is read-only.

use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde::Serialize;
use tracing::debug;

use super::conversations::{ensure_channel_allowed, ensure_write_tool_enabled};
use super::{csv_result, text_result, Args};
use crate::auth::AuthContext;
use crate::config;
use crate::error::ServerError;
use crate::provider::Provider;
use crate::tools;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageReactionsRow {
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Reactions")]
    pub reactions: String,
}

pub struct ReactionsHandler {
    provider: Arc<Provider>,
}

struct ReactionParams {
    channel: String,
    timestamp: String,
    emoji: String,
}

impl ReactionsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn add(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let params = self.parse_write_params(request).await?;
        debug!(channel = %params.channel, emoji = %params.emoji, "adding reaction");
        client
            .add_reaction(&params.emoji, &params.channel, &params.timestamp)
            .await?;
        Ok(text_result(format!(
            "Successfully added :{}: reaction to message {} in channel {}",
            params.emoji, params.timestamp, params.channel
        )))
    }

    pub async fn remove(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let params = self.parse_write_params(request).await?;
        debug!(channel = %params.channel, emoji = %params.emoji, "removing reaction");
        client
            .remove_reaction(&params.emoji, &params.channel, &params.timestamp)
            .await?;
        Ok(text_result(format!(
            "Successfully removed :{}: reaction from message {} in channel {}",
            params.emoji, params.timestamp, params.channel
        )))
    }

    pub async fn get(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let channel = args.str("channel_id", "");
        if channel.is_empty() {
            return Err(ServerError::InvalidParams("channel_id is required".into()));
        }
        let channel = self.provider.resolve_channel_id(&channel).await?;
        let timestamp = args.str("timestamp", "");
        if timestamp.is_empty() {
            return Err(ServerError::InvalidParams("timestamp is required".into()));
        }

        let response = client.get_reactions(&channel, &timestamp).await?;
        let reactions = response
            .message
            .reactions
            .iter()
            .map(|r| format!("{}:{}", r.name, r.count))
            .collect::<Vec<_>>()
            .join("|");

        csv_result(&[MessageReactionsRow {
            channel,
            timestamp,
            reactions,
        }])
    }

    async fn parse_write_params(
        &self,
        request: &CallToolRequestParam,
    ) -> Result<ReactionParams, ServerError> {
        let policy = config::reaction_tool_config();
        ensure_write_tool_enabled(
            tools::TOOL_REACTIONS_ADD,
            &policy,
            "the reactions tools are disabled to guard Slack workspaces against accidental spamming. \
             Set SLACK_MCP_REACTION_TOOL=true to enable them for all channels, or to a comma-separated \
             channel list (prefix entries with ! to block instead of allow)",
        )?;

        let args = Args(request.arguments.as_ref());
        let channel = args.str("channel_id", "");
        if channel.is_empty() {
            return Err(ServerError::InvalidParams("channel_id is required".into()));
        }
        let channel = self.provider.resolve_channel_id(&channel).await?;
        ensure_channel_allowed(&channel, &policy, "reactions tools")?;

        let timestamp = args.str("timestamp", "");
        if timestamp.is_empty() {
            return Err(ServerError::InvalidParams("timestamp is required".into()));
        }

        let emoji = args.str("emoji", "").trim_matches(':').to_string();
        if emoji.is_empty() {
            return Err(ServerError::InvalidParams("emoji is required".into()));
        }

        Ok(ReactionParams {
            channel,
            timestamp,
            emoji,
        })
    }
}
