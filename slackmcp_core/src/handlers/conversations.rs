//! Conversation tools: history, replies, search, add/edit/delete message
//! and mark-as-read.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Datelike, Local, TimeZone};
use rmcp::model::{CallToolRequestParam, CallToolResult};
use tracing::{debug, warn};

use super::{
    convert_messages_from_history, convert_messages_from_search, csv_result, text_result, Args,
};
use crate::auth::AuthContext;
use crate::config;
use crate::error::ServerError;
use crate::provider::Provider;
use crate::search_query::{compose_query, SearchFilterParams};
use crate::slack::{HistoryParams, PostMessageOptions};
use crate::tools;

const DEFAULT_NUMERIC_LIMIT: u32 = 50;
const DEFAULT_EXPRESSION_LIMIT: &str = "1d";
const DEFAULT_SEARCH_LIMIT: i64 = 100;

pub struct ConversationsHandler {
    provider: Arc<Provider>,
}

impl ConversationsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn history(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let params = self.parse_conversation_params(request).await?;
        debug!(channel = %params.channel, limit = params.limit, "conversations_history");

        let history = client.conversation_history(&params.to_history_params()).await?;
        let users = self.provider.users_snapshot().await;
        let mut rows = convert_messages_from_history(
            &history.messages,
            &params.channel,
            params.include_activity,
            &users,
        );
        if history.has_more {
            if let Some(last) = rows.last_mut() {
                last.cursor = history.response_metadata.next_cursor.clone();
            }
        }
        csv_result(&rows)
    }

    pub async fn replies(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let params = self.parse_conversation_params(request).await?;
        let thread_ts = Args(request.arguments.as_ref()).str("thread_ts", "");
        if thread_ts.is_empty() {
            return Err(ServerError::InvalidParams("thread_ts must be a string".into()));
        }
        if !thread_ts.contains('.') {
            return Err(ServerError::InvalidParams(
                "thread_ts must be a valid timestamp in format 1234567890.123456".into(),
            ));
        }

        let replies = client
            .conversation_replies(&thread_ts, &params.to_history_params())
            .await?;
        let users = self.provider.users_snapshot().await;
        let mut rows = convert_messages_from_history(
            &replies.messages,
            &params.channel,
            params.include_activity,
            &users,
        );
        if replies.has_more {
            if let Some(last) = rows.last_mut() {
                last.cursor = replies.response_metadata.next_cursor.clone();
            }
        }
        csv_result(&rows)
    }

    pub async fn search(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let filter_params = SearchFilterParams {
            in_channel: args.str("filter_in_channel", ""),
            in_im_or_mpim: args.str("filter_in_im_or_mpim", ""),
            users_with: args.str("filter_users_with", ""),
            users_from: args.str("filter_users_from", ""),
            date_before: args.str("filter_date_before", ""),
            date_after: args.str("filter_date_after", ""),
            date_on: args.str("filter_date_on", ""),
            date_during: args.str("filter_date_during", ""),
            threads_only: args.bool("filter_threads_only", false),
        };
        let raw_query = args.str("search_query", "");

        let needs_resolution = !filter_params.in_channel.is_empty()
            || !filter_params.in_im_or_mpim.is_empty()
            || !filter_params.users_with.is_empty()
            || !filter_params.users_from.is_empty();
        if needs_resolution {
            self.provider.is_ready()?;
        }

        let users = self.provider.users_snapshot().await;
        let channels = self.provider.channels_snapshot().await;
        let query = compose_query(
            &raw_query,
            &filter_params,
            &users,
            &channels,
            Local::now().date_naive(),
        )?;

        let limit = args.int("limit", DEFAULT_SEARCH_LIMIT).clamp(1, 100) as u32;
        let page = match args.str("cursor", "").as_str() {
            "" => 1,
            cursor => decode_page_cursor(cursor)?,
        };
        debug!(query = %query, limit, page, "conversations_search_messages");

        let limiter = crate::limiter::Tier::Tier2Boost.limiter();
        let response = crate::limiter::call_with_retry(
            &limiter,
            2,
            crate::limiter::slack_retry_after,
            || {
                let client = client.clone();
                let query = query.clone();
                async move { client.search_messages(&query, limit, page).await }
            },
        )
        .await?;

        let mut rows = convert_messages_from_search(&response.messages.matches, &users);
        let pagination = &response.messages.pagination;
        if !rows.is_empty() && pagination.page < pagination.page_count {
            if let Some(last) = rows.last_mut() {
                last.cursor = encode_page_cursor(pagination.page + 1);
            }
        }
        csv_result(&rows)
    }

    pub async fn add_message(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let policy = config::env(config::ENV_ADD_MESSAGE_TOOL);
        ensure_write_tool_enabled(
            tools::TOOL_CONVERSATIONS_ADD_MESSAGE,
            &policy,
            "the conversations_add_message tool is disabled to guard Slack workspaces against accidental spamming. \
             Set SLACK_MCP_ADD_MESSAGE_TOOL=true to enable it for all channels, or to a comma-separated channel list \
             (prefix entries with ! to block instead of allow)",
        )?;

        let channel = self.required_channel(&args).await?;
        ensure_channel_allowed(&channel, &policy, tools::TOOL_CONVERSATIONS_ADD_MESSAGE)?;

        let thread_ts = args.str("thread_ts", "");
        if !thread_ts.is_empty() && !thread_ts.contains('.') {
            return Err(ServerError::InvalidParams(
                "thread_ts must be a valid timestamp in format 1234567890.123456".into(),
            ));
        }

        let mut text = args.str("text", "");
        if text.is_empty() {
            // Older clients send the message body as "payload".
            text = args.str("payload", "");
        }
        if text.is_empty() {
            return Err(ServerError::InvalidParams("text must be a string".into()));
        }

        let content_type = args.str("content_type", "text/markdown");
        let mrkdwn = match content_type.as_str() {
            "text/markdown" => true,
            "text/plain" => false,
            _ => {
                return Err(ServerError::InvalidParams(
                    "content_type must be either 'text/plain' or 'text/markdown'".into(),
                ))
            }
        };

        let unfurl_policy = config::env(config::ENV_ADD_MESSAGE_UNFURLING);
        let unfurl = crate::text::is_unfurling_enabled(&text, &unfurl_policy);

        let opts = PostMessageOptions {
            thread_ts: if thread_ts.is_empty() { None } else { Some(thread_ts) },
            mrkdwn,
            unfurl_links: unfurl,
            unfurl_media: unfurl,
        };
        debug!(channel = %channel, content_type = %content_type, "posting message");
        let posted = client.post_message(&channel, &text, &opts).await?;

        if config::is_truthy(&config::env(config::ENV_ADD_MESSAGE_MARK)) {
            client.mark_conversation(&posted.channel, &posted.ts).await?;
        }

        // Re-fetch the posted message so the response carries exactly what
        // Slack stored (server-side formatting included).
        let fetched = client
            .conversation_history(&HistoryParams {
                channel: posted.channel.clone(),
                limit: 1,
                oldest: posted.ts.clone(),
                latest: posted.ts.clone(),
                inclusive: true,
                ..Default::default()
            })
            .await?;
        let users = self.provider.users_snapshot().await;
        let rows = convert_messages_from_history(&fetched.messages, &posted.channel, false, &users);
        csv_result(&rows)
    }

    pub async fn edit_message(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let policy = config::env(config::ENV_EDIT_MESSAGE_TOOL);
        ensure_write_tool_enabled(
            tools::TOOL_CONVERSATIONS_EDIT_MESSAGE,
            &policy,
            "the conversations_edit_message tool is disabled by default. Set SLACK_MCP_EDIT_MESSAGE_TOOL=true \
             to enable it for all channels, or to a comma-separated channel list",
        )?;

        let channel = self.required_channel(&args).await?;
        ensure_channel_allowed(&channel, &policy, tools::TOOL_CONVERSATIONS_EDIT_MESSAGE)?;

        let message_ts = required_ts(&args, "message_ts")?;
        let text = args.str("text", "");
        if text.is_empty() {
            return Err(ServerError::InvalidParams("text must be a string".into()));
        }
        let content_type = args.str("content_type", "text/markdown");
        let mrkdwn = match content_type.as_str() {
            "text/markdown" => true,
            "text/plain" => false,
            _ => {
                return Err(ServerError::InvalidParams(
                    "content_type must be either 'text/plain' or 'text/markdown'".into(),
                ))
            }
        };

        let updated = client.update_message(&channel, &message_ts, &text, mrkdwn).await?;

        let fetched = client
            .conversation_history(&HistoryParams {
                channel: channel.clone(),
                limit: 1,
                oldest: updated.ts.clone(),
                latest: updated.ts.clone(),
                inclusive: true,
                ..Default::default()
            })
            .await?;
        let users = self.provider.users_snapshot().await;
        let rows = convert_messages_from_history(&fetched.messages, &channel, false, &users);
        csv_result(&rows)
    }

    pub async fn delete_message(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let policy = config::env(config::ENV_DELETE_MESSAGE_TOOL);
        ensure_write_tool_enabled(
            tools::TOOL_CONVERSATIONS_DELETE_MESSAGE,
            &policy,
            "the conversations_delete_message tool is disabled by default. Set SLACK_MCP_DELETE_MESSAGE_TOOL=true \
             to enable it for all channels, or to a comma-separated channel list",
        )?;

        let channel = self.required_channel(&args).await?;
        ensure_channel_allowed(&channel, &policy, tools::TOOL_CONVERSATIONS_DELETE_MESSAGE)?;
        let message_ts = required_ts(&args, "message_ts")?;

        client.delete_message(&channel, &message_ts).await?;
        Ok(text_result(format!(
            "Deleted message {} from channel {}",
            message_ts, channel
        )))
    }

    pub async fn mark(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let policy = config::env(config::ENV_MARK_TOOL);
        if policy.is_empty() || !config::is_truthy(&policy) {
            return Err(ServerError::PolicyDenied(
                "the conversations_mark tool is disabled to prevent accidental marking of messages as read. \
                 Set SLACK_MCP_MARK_TOOL=true to enable it"
                    .into(),
            ));
        }

        let channel = self.required_channel(&args).await?;
        let mut ts = args.str("ts", "");

        if ts.is_empty() {
            let history = client
                .conversation_history(&HistoryParams {
                    channel: channel.clone(),
                    limit: 1,
                    ..Default::default()
                })
                .await?;
            match history.messages.first() {
                Some(latest) => ts = latest.ts.clone(),
                None => return Ok(text_result("No messages to mark as read".to_string())),
            }
        }

        client.mark_conversation(&channel, &ts).await?;
        Ok(text_result(format!("Marked {} as read up to {}", channel, ts)))
    }

    async fn required_channel(&self, args: &Args<'_>) -> Result<String, ServerError> {
        let channel = args.str("channel_id", "");
        if channel.is_empty() {
            return Err(ServerError::InvalidParams("channel_id must be a string".into()));
        }
        self.resolve_reference(&channel).await
    }

    /// Resolve a channel reference, gating name lookups on readiness.
    async fn resolve_reference(&self, channel: &str) -> Result<String, ServerError> {
        if channel.starts_with('#') || channel.starts_with('@') {
            if let Err(e) = self.provider.is_ready() {
                warn!(channel, error = %e, "name resolution requested before sync is ready");
                return Err(e);
            }
        }
        self.provider.resolve_channel_id(channel).await
    }

    async fn parse_conversation_params(
        &self,
        request: &CallToolRequestParam,
    ) -> Result<ConversationParams, ServerError> {
        let args = Args(request.arguments.as_ref());
        let channel = args.str("channel_id", "");
        if channel.is_empty() {
            return Err(ServerError::InvalidParams("channel_id must be a string".into()));
        }
        let channel = self.resolve_reference(&channel).await?;

        let limit = args.str("limit", "");
        let cursor = args.str("cursor", "");
        let include_activity = args.bool("include_activity_messages", false);

        let mut params = ConversationParams {
            channel,
            cursor: cursor.clone(),
            include_activity,
            ..Default::default()
        };

        if limit.ends_with('d') || limit.ends_with('w') || limit.ends_with('m') {
            if !cursor.is_empty() {
                return Err(ServerError::InvalidParams(
                    "cursor cannot be combined with a duration limit".into(),
                ));
            }
            let (slack_limit, oldest, latest) =
                limit_by_expression(&limit, DEFAULT_EXPRESSION_LIMIT, Local::now())?;
            params.limit = slack_limit;
            params.oldest = oldest;
            params.latest = latest;
        } else if cursor.is_empty() {
            params.limit = limit_by_numeric(&limit, DEFAULT_NUMERIC_LIMIT)?;
        }

        Ok(params)
    }

}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConversationParams {
    pub channel: String,
    pub limit: u32,
    pub oldest: String,
    pub latest: String,
    pub cursor: String,
    pub include_activity: bool,
}

impl ConversationParams {
    fn to_history_params(&self) -> HistoryParams {
        HistoryParams {
            channel: self.channel.clone(),
            limit: self.limit,
            oldest: self.oldest.clone(),
            latest: self.latest.clone(),
            cursor: self.cursor.clone(),
            inclusive: false,
        }
    }
}

pub(crate) fn ensure_write_tool_enabled(
    tool: &str,
    policy: &str,
    help: &str,
) -> Result<(), ServerError> {
    if !policy.is_empty() {
        return Ok(());
    }
    let enabled = tools::enabled_tools_from_env();
    if enabled.iter().any(|t| t == tool) {
        return Ok(());
    }
    Err(ServerError::PolicyDenied(format!("by default, {}", help)))
}

pub(crate) fn ensure_channel_allowed(
    channel: &str,
    policy: &str,
    tool: &str,
) -> Result<(), ServerError> {
    if tools::is_channel_allowed_for_config(channel, policy) {
        return Ok(());
    }
    Err(ServerError::PolicyDenied(format!(
        "{} is not allowed for channel {:?}, applied policy: {}",
        tool, channel, policy
    )))
}

fn required_ts(args: &Args<'_>, key: &str) -> Result<String, ServerError> {
    let ts = args.str(key, "");
    if ts.is_empty() {
        return Err(ServerError::InvalidParams(format!("{} is required", key)));
    }
    if !ts.contains('.') {
        return Err(ServerError::InvalidParams(format!(
            "{} must be a valid timestamp in format 1234567890.123456",
            key
        )));
    }
    Ok(ts)
}

pub(crate) fn encode_page_cursor(page: u32) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("page:{}", page))
}

pub(crate) fn decode_page_cursor(cursor: &str) -> Result<u32, ServerError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|e| ServerError::InvalidParams(format!("invalid cursor: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| ServerError::InvalidParams(format!("invalid cursor: {:?}", cursor)))?;
    let page = decoded
        .strip_prefix("page:")
        .ok_or_else(|| ServerError::InvalidParams(format!("invalid cursor: {:?}", cursor)))?;
    let page: u32 = page
        .parse()
        .map_err(|_| ServerError::InvalidParams(format!("invalid cursor page: {:?}", cursor)))?;
    if page < 1 {
        return Err(ServerError::InvalidParams(format!(
            "invalid cursor page: {:?}",
            cursor
        )));
    }
    Ok(page)
}

fn limit_by_numeric(limit: &str, default: u32) -> Result<u32, ServerError> {
    if limit.is_empty() {
        return Ok(default);
    }
    limit
        .parse()
        .map_err(|_| ServerError::InvalidParams(format!("invalid numeric limit: {:?}", limit)))
}

/// Convert a duration expression (`Nd`/`Nw`/`Nm`) into a Slack
/// oldest/latest window: local midnight of the period start through now.
fn limit_by_expression(
    limit: &str,
    default: &str,
    now: DateTime<Local>,
) -> Result<(u32, String, String), ServerError> {
    let limit = if limit.is_empty() { default } else { limit };
    if limit.len() < 2 {
        return Err(ServerError::InvalidParams(format!(
            "invalid duration limit {:?}: too short",
            limit
        )));
    }
    let (num_str, suffix) = limit.split_at(limit.len() - 1);
    let n: i64 = num_str.parse().map_err(|_| {
        ServerError::InvalidParams(format!(
            "invalid duration limit {:?}: must be a positive integer followed by 'd', 'w', or 'm'",
            limit
        ))
    })?;
    if n <= 0 {
        return Err(ServerError::InvalidParams(format!(
            "invalid duration limit {:?}: must be a positive integer followed by 'd', 'w', or 'm'",
            limit
        )));
    }

    let start_of_today = Local
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .ok_or_else(|| ServerError::Internal("cannot compute local midnight".into()))?;

    let oldest_time = match suffix {
        "d" => start_of_today + chrono::Duration::days(-n + 1),
        "w" => start_of_today + chrono::Duration::days(-n * 7 + 1),
        "m" => start_of_today
            .checked_sub_months(chrono::Months::new(n as u32))
            .ok_or_else(|| {
                ServerError::InvalidParams(format!("invalid duration limit {:?}", limit))
            })?,
        _ => {
            return Err(ServerError::InvalidParams(format!(
                "invalid duration limit {:?}: must end in 'd', 'w', or 'm'",
                limit
            )))
        }
    };

    let latest = format!("{}.000000", now.timestamp());
    let oldest = format!("{}.000000", oldest_time.timestamp());
    Ok((100, oldest, latest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_cursor_roundtrip() {
        for page in [1u32, 2, 7, 9999] {
            let cursor = encode_page_cursor(page);
            assert_eq!(decode_page_cursor(&cursor).unwrap(), page);
        }
    }

    #[test]
    fn page_cursor_rejects_garbage() {
        assert!(decode_page_cursor("not base64!!").is_err());
        let bogus = base64::engine::general_purpose::STANDARD.encode("offset:5");
        assert!(decode_page_cursor(&bogus).is_err());
        let zero = base64::engine::general_purpose::STANDARD.encode("page:0");
        assert!(decode_page_cursor(&zero).is_err());
    }

    #[test]
    fn numeric_limit_parsing() {
        assert_eq!(limit_by_numeric("", 50).unwrap(), 50);
        assert_eq!(limit_by_numeric("25", 50).unwrap(), 25);
        assert!(limit_by_numeric("7d", 50).is_err());
    }

    #[test]
    fn duration_expression_window() {
        let now = Local.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).single().unwrap();
        let (limit, oldest, latest) = limit_by_expression("7d", "1d", now).unwrap();
        assert_eq!(limit, 100);

        let midnight = Local.with_ymd_and_hms(2025, 1, 4, 0, 0, 0).single().unwrap();
        assert_eq!(oldest, format!("{}.000000", midnight.timestamp()));
        assert_eq!(latest, format!("{}.000000", now.timestamp()));
    }

    #[test]
    fn duration_expression_weeks_and_months() {
        let now = Local.with_ymd_and_hms(2025, 3, 15, 9, 30, 0).single().unwrap();

        let (_, oldest, _) = limit_by_expression("2w", "1d", now).unwrap();
        let expected = Local.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).single().unwrap();
        assert_eq!(oldest, format!("{}.000000", expected.timestamp()));

        let (_, oldest, _) = limit_by_expression("1m", "1d", now).unwrap();
        let expected = Local.with_ymd_and_hms(2025, 2, 15, 0, 0, 0).single().unwrap();
        assert_eq!(oldest, format!("{}.000000", expected.timestamp()));
    }

    #[test]
    fn duration_expression_defaults_to_one_day() {
        let now = Local.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).single().unwrap();
        let (_, oldest, _) = limit_by_expression("", "1d", now).unwrap();
        let midnight = Local.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).single().unwrap();
        assert_eq!(oldest, format!("{}.000000", midnight.timestamp()));
    }

    #[test]
    fn duration_expression_rejects_bad_input() {
        let now = Local::now();
        assert!(limit_by_expression("d", "1d", now).is_err());
        assert!(limit_by_expression("0d", "1d", now).is_err());
        assert!(limit_by_expression("-3d", "1d", now).is_err());
        assert!(limit_by_expression("7x", "1d", now).is_err());
    }

    #[test]
    fn required_ts_validation() {
        let map = serde_json::json!({"message_ts": "1234567890.123456"});
        let map = map.as_object().unwrap().clone();
        let args = Args(Some(&map));
        assert_eq!(required_ts(&args, "message_ts").unwrap(), "1234567890.123456");

        let map = serde_json::json!({"message_ts": "1234567890"});
        let map = map.as_object().unwrap().clone();
        let args = Args(Some(&map));
        assert!(required_ts(&args, "message_ts").is_err());
    }
}
