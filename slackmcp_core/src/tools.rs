//! Tool registration policy and tool schemas.
//!
//! The set of tool names is fixed and closed. Whether a tool is advertised
//! to the MCP client depends on the explicit `SLACK_MCP_ENABLED_TOOLS`
//! list and, for write tools, on a per-tool env var whose value doubles as
//! a per-invocation channel allow/deny list (`!`-prefix negates).

use std::sync::Arc;

use rmcp::model::Tool;
use serde_json::{json, Value};

use crate::config;
use crate::error::ServerError;

pub const TOOL_CONVERSATIONS_HISTORY: &str = "conversations_history";
pub const TOOL_CONVERSATIONS_REPLIES: &str = "conversations_replies";
pub const TOOL_CONVERSATIONS_ADD_MESSAGE: &str = "conversations_add_message";
pub const TOOL_CONVERSATIONS_EDIT_MESSAGE: &str = "conversations_edit_message";
pub const TOOL_CONVERSATIONS_DELETE_MESSAGE: &str = "conversations_delete_message";
pub const TOOL_CONVERSATIONS_SEARCH_MESSAGES: &str = "conversations_search_messages";
pub const TOOL_CONVERSATIONS_MARK: &str = "conversations_mark";
pub const TOOL_CONVERSATIONS_UNREADS: &str = "conversations_unreads";
pub const TOOL_CHANNELS_LIST: &str = "channels_list";
pub const TOOL_CHANNEL_MEMBERS_LIST: &str = "channel_members_list";
pub const TOOL_REACTIONS_ADD: &str = "reactions_add";
pub const TOOL_REACTIONS_REMOVE: &str = "reactions_remove";
pub const TOOL_REACTIONS_GET: &str = "reactions_get";
pub const TOOL_ATTACHMENT_GET_DATA: &str = "attachment_get_data";
pub const TOOL_USERS_SEARCH: &str = "users_search";
pub const TOOL_USERGROUPS_LIST: &str = "usergroups_list";
pub const TOOL_LISTS_ITEMS_LIST: &str = "lists_items_list";

pub const VALID_TOOL_NAMES: &[&str] = &[
    TOOL_CONVERSATIONS_HISTORY,
    TOOL_CONVERSATIONS_REPLIES,
    TOOL_CONVERSATIONS_ADD_MESSAGE,
    TOOL_CONVERSATIONS_EDIT_MESSAGE,
    TOOL_CONVERSATIONS_DELETE_MESSAGE,
    TOOL_CONVERSATIONS_SEARCH_MESSAGES,
    TOOL_CONVERSATIONS_MARK,
    TOOL_CONVERSATIONS_UNREADS,
    TOOL_CHANNELS_LIST,
    TOOL_CHANNEL_MEMBERS_LIST,
    TOOL_REACTIONS_ADD,
    TOOL_REACTIONS_REMOVE,
    TOOL_REACTIONS_GET,
    TOOL_ATTACHMENT_GET_DATA,
    TOOL_USERS_SEARCH,
    TOOL_USERGROUPS_LIST,
    TOOL_LISTS_ITEMS_LIST,
];

/// Read tools register whenever the explicit list allows them.
pub fn should_add_tool(tool: &str, enabled: &[String]) -> bool {
    if enabled.is_empty() {
        return true;
    }
    enabled.iter().any(|t| t == tool)
}

/// Write tools additionally require their enable env var to be non-empty
/// when no explicit list is configured.
pub fn should_add_write_tool(tool: &str, enabled: &[String], env_value: &str) -> bool {
    if enabled.is_empty() {
        return !env_value.is_empty();
    }
    enabled.iter().any(|t| t == tool)
}

/// Parse `SLACK_MCP_ENABLED_TOOLS` into a list (empty -> all defaults).
pub fn enabled_tools_from_env() -> Vec<String> {
    config::env(config::ENV_ENABLED_TOOLS)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn validate_enabled_tools(enabled: &[String]) -> Result<(), ServerError> {
    let invalid: Vec<&str> = enabled
        .iter()
        .filter(|t| !VALID_TOOL_NAMES.iter().any(|v| *v == t.as_str()))
        .map(String::as_str)
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    Err(ServerError::InvalidInput(format!(
        "invalid tool name(s): {}. Valid tools are: {}",
        invalid.join(", "),
        VALID_TOOL_NAMES.join(", ")
    )))
}

/// Per-invocation channel policy for a write tool.
///
/// `""`, `"true"` and `"1"` allow every channel. A comma-separated list is
/// an allowlist, unless its first entry is `!`-prefixed, which flips the
/// whole list into a blocklist.
pub fn is_channel_allowed_for_config(channel: &str, policy: &str) -> bool {
    if policy.is_empty() || policy == "true" || policy == "1" {
        return true;
    }
    let items: Vec<&str> = policy.split(',').map(str::trim).collect();
    let negated = items
        .first()
        .map(|i| i.starts_with('!'))
        .unwrap_or(false);
    for item in &items {
        if negated {
            if item.strip_prefix('!').unwrap_or(item) == channel {
                return false;
            }
        } else if *item == channel {
            return true;
        }
    }
    negated
}

/// The env var controlling each write tool; read tools return `None`.
pub fn write_tool_env_value(tool: &str) -> Option<String> {
    match tool {
        TOOL_CONVERSATIONS_ADD_MESSAGE => Some(config::env(config::ENV_ADD_MESSAGE_TOOL)),
        TOOL_REACTIONS_ADD | TOOL_REACTIONS_REMOVE => Some(config::reaction_tool_config()),
        TOOL_ATTACHMENT_GET_DATA => Some(config::env(config::ENV_ATTACHMENT_TOOL)),
        TOOL_CONVERSATIONS_EDIT_MESSAGE => Some(config::env(config::ENV_EDIT_MESSAGE_TOOL)),
        TOOL_CONVERSATIONS_DELETE_MESSAGE => Some(config::env(config::ENV_DELETE_MESSAGE_TOOL)),
        TOOL_CONVERSATIONS_MARK => Some(config::env(config::ENV_MARK_TOOL)),
        _ => None,
    }
}

/// Apply the registration matrix to the full tool set.
pub fn registered_tools(enabled: &[String]) -> Vec<&'static str> {
    VALID_TOOL_NAMES
        .iter()
        .copied()
        .filter(|tool| match write_tool_env_value(tool) {
            Some(env_value) => should_add_write_tool(tool, enabled, &env_value),
            None => should_add_tool(tool, enabled),
        })
        .collect()
}

fn schema(value: Value) -> Arc<serde_json::Map<String, Value>> {
    Arc::new(
        value
            .as_object()
            .expect("tool schema must be a JSON object")
            .clone(),
    )
}

fn tool(name: &'static str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.into(),
        title: None,
        description: Some(description.to_string().into()),
        input_schema: schema(input_schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

/// Build the advertised tool list for the given registered names.
pub fn tool_definitions(registered: &[&'static str]) -> Vec<Tool> {
    let channel_id_prop = json!({
        "type": "string",
        "description": "Channel ID (C.., G.., D..) or name (#general, @username_dm)"
    });

    registered
        .iter()
        .map(|name| match *name {
            TOOL_CONVERSATIONS_HISTORY => tool(
                TOOL_CONVERSATIONS_HISTORY,
                "Get messages from a channel or DM as CSV. Supports cursor pagination and duration limits (1d, 1w, 30d).",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "limit": {"type": "string", "description": "Message count or duration expression like '1d', '2w', '3m'. Default: last 50 messages; pass a duration for a time window"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor from a previous page"},
                        "include_activity_messages": {"type": "boolean", "description": "Include channel_join/leave and similar activity messages. Default false"}
                    },
                    "required": ["channel_id"]
                }),
            ),
            TOOL_CONVERSATIONS_REPLIES => tool(
                TOOL_CONVERSATIONS_REPLIES,
                "Get a thread of messages as CSV, given the channel and the thread's parent timestamp.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "thread_ts": {"type": "string", "description": "Parent message timestamp in format 1234567890.123456"},
                        "limit": {"type": "string", "description": "Message count or duration expression like '1d', '2w', '3m'"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor"},
                        "include_activity_messages": {"type": "boolean"}
                    },
                    "required": ["channel_id", "thread_ts"]
                }),
            ),
            TOOL_CONVERSATIONS_ADD_MESSAGE => tool(
                TOOL_CONVERSATIONS_ADD_MESSAGE,
                "Post a message to a channel, DM or thread. Returns the posted message as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "text": {"type": "string", "description": "Message text"},
                        "payload": {"type": "string", "description": "Legacy alias of 'text'"},
                        "thread_ts": {"type": "string", "description": "Reply in this thread (format 1234567890.123456)"},
                        "content_type": {"type": "string", "description": "text/markdown (default) or text/plain"}
                    },
                    "required": ["channel_id"]
                }),
            ),
            TOOL_CONVERSATIONS_EDIT_MESSAGE => tool(
                TOOL_CONVERSATIONS_EDIT_MESSAGE,
                "Edit an existing message. Returns the edited message as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "message_ts": {"type": "string", "description": "Timestamp of the message to edit (format 1234567890.123456)"},
                        "text": {"type": "string", "description": "New message text"},
                        "content_type": {"type": "string", "description": "text/markdown (default) or text/plain"}
                    },
                    "required": ["channel_id", "message_ts", "text"]
                }),
            ),
            TOOL_CONVERSATIONS_DELETE_MESSAGE => tool(
                TOOL_CONVERSATIONS_DELETE_MESSAGE,
                "Delete a message from a channel.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "message_ts": {"type": "string", "description": "Timestamp of the message to delete (format 1234567890.123456)"}
                    },
                    "required": ["channel_id", "message_ts"]
                }),
            ),
            TOOL_CONVERSATIONS_SEARCH_MESSAGES => tool(
                TOOL_CONVERSATIONS_SEARCH_MESSAGES,
                "Search messages workspace-wide with Slack search operators plus structured filters. Returns CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "search_query": {"type": "string", "description": "Free text, may embed operators like in:#general from:@alice"},
                        "filter_in_channel": {"type": "string", "description": "Restrict to a channel (#name or ID)"},
                        "filter_in_im_or_mpim": {"type": "string", "description": "Restrict to a DM/group DM (@handle or ID)"},
                        "filter_users_with": {"type": "string", "description": "Conversations with this user (@handle or ID)"},
                        "filter_users_from": {"type": "string", "description": "Messages from this user (@handle or ID)"},
                        "filter_date_before": {"type": "string", "description": "Date filter; flexible formats, e.g. 2025-01-10, 'July 2024', 'yesterday'"},
                        "filter_date_after": {"type": "string"},
                        "filter_date_on": {"type": "string"},
                        "filter_date_during": {"type": "string"},
                        "filter_threads_only": {"type": "boolean", "description": "Only messages in threads"},
                        "limit": {"type": "number", "description": "Results per page, default 100 (Slack's page maximum)"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor"}
                    }
                }),
            ),
            TOOL_CONVERSATIONS_MARK => tool(
                TOOL_CONVERSATIONS_MARK,
                "Mark a channel as read up to a timestamp (defaults to the channel's latest message).",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "ts": {"type": "string", "description": "Mark read up to this timestamp; defaults to the latest message"}
                    },
                    "required": ["channel_id"]
                }),
            ),
            TOOL_CONVERSATIONS_UNREADS => tool(
                TOOL_CONVERSATIONS_UNREADS,
                "Discover channels with unread messages, prioritised DMs first. Optionally fetch the unread messages themselves.",
                json!({
                    "type": "object",
                    "properties": {
                        "include_messages": {"type": "boolean", "description": "Fetch unread messages per channel instead of a channel summary. Default true"},
                        "channel_types": {"type": "string", "description": "all (default), dm, group_dm, partner or internal"},
                        "max_channels": {"type": "number", "description": "Cap on returned channels. Default 50"},
                        "max_messages_per_channel": {"type": "number", "description": "Cap on messages fetched per channel. Default 10"},
                        "mentions_only": {"type": "boolean", "description": "Only channels where you were @mentioned"},
                        "include_muted": {"type": "boolean", "description": "Include muted channels. Default false"}
                    }
                }),
            ),
            TOOL_CHANNELS_LIST => tool(
                TOOL_CHANNELS_LIST,
                "List channels from the workspace directory as CSV, sorted by member count.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_types": {"type": "string", "description": "Comma-separated: public_channel, private_channel, im, mpim"},
                        "sort": {"type": "string", "description": "popularity (member count, default) or none"},
                        "limit": {"type": "number", "description": "Page size, default 100, max 999"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor"}
                    }
                }),
            ),
            TOOL_CHANNEL_MEMBERS_LIST => tool(
                TOOL_CHANNEL_MEMBERS_LIST,
                "List the members of a channel as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "include_bots": {"type": "boolean", "description": "Include bot users. Default false"},
                        "limit": {"type": "number", "description": "Page size, default 100"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor"}
                    },
                    "required": ["channel_id"]
                }),
            ),
            TOOL_REACTIONS_ADD => tool(
                TOOL_REACTIONS_ADD,
                "Add an emoji reaction to a message.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "timestamp": {"type": "string", "description": "Message timestamp (format 1234567890.123456)"},
                        "emoji": {"type": "string", "description": "Emoji name with or without colons, e.g. thumbsup"}
                    },
                    "required": ["channel_id", "timestamp", "emoji"]
                }),
            ),
            TOOL_REACTIONS_REMOVE => tool(
                TOOL_REACTIONS_REMOVE,
                "Remove an emoji reaction from a message.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "timestamp": {"type": "string"},
                        "emoji": {"type": "string"}
                    },
                    "required": ["channel_id", "timestamp", "emoji"]
                }),
            ),
            TOOL_REACTIONS_GET => tool(
                TOOL_REACTIONS_GET,
                "Get the reactions on a message as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "channel_id": channel_id_prop,
                        "timestamp": {"type": "string"}
                    },
                    "required": ["channel_id", "timestamp"]
                }),
            ),
            TOOL_ATTACHMENT_GET_DATA => tool(
                TOOL_ATTACHMENT_GET_DATA,
                "Download a file attachment (max 5 MiB). Text files are returned inline; binary files base64-encoded.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_id": {"type": "string", "description": "Slack file ID from a message's AttachmentIDs"}
                    },
                    "required": ["file_id"]
                }),
            ),
            TOOL_USERS_SEARCH => tool(
                TOOL_USERS_SEARCH,
                "Search workspace users by name, email or display name. Requires browser session tokens.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Name, email or display-name fragment"},
                        "limit": {"type": "number", "description": "Max results, default 10, max 100"}
                    },
                    "required": ["query"]
                }),
            ),
            TOOL_USERGROUPS_LIST => tool(
                TOOL_USERGROUPS_LIST,
                "List the workspace's user groups as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "include_users": {"type": "boolean", "description": "Include member user IDs. Default false"},
                        "include_count": {"type": "boolean", "description": "Include member counts. Default true"},
                        "include_disabled": {"type": "boolean", "description": "Include disabled groups. Default false"}
                    }
                }),
            ),
            TOOL_LISTS_ITEMS_LIST => tool(
                TOOL_LISTS_ITEMS_LIST,
                "List the items of a Slack List as CSV. Requires browser session tokens.",
                json!({
                    "type": "object",
                    "properties": {
                        "list_id": {"type": "string", "description": "Slack List ID (F..)"},
                        "limit": {"type": "number", "description": "Page size, default 100"},
                        "cursor": {"type": "string", "description": "Opaque pagination cursor"}
                    },
                    "required": ["list_id"]
                }),
            ),
            other => unreachable!("unknown registered tool {}", other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn read_tools_register_with_empty_enabled_list() {
        for tool in VALID_TOOL_NAMES {
            assert!(should_add_tool(tool, &[]), "{} should register", tool);
        }
    }

    #[test]
    fn explicit_enabled_list_is_exclusive() {
        let enabled = list(&[TOOL_CONVERSATIONS_HISTORY, TOOL_CHANNELS_LIST]);
        assert!(should_add_tool(TOOL_CONVERSATIONS_HISTORY, &enabled));
        assert!(!should_add_tool(TOOL_CONVERSATIONS_REPLIES, &enabled));
        assert!(!should_add_tool(TOOL_CONVERSATIONS_ADD_MESSAGE, &enabled));
    }

    #[test]
    fn write_tool_matrix() {
        // | enabled | env var | result |
        assert!(!should_add_write_tool(TOOL_CONVERSATIONS_ADD_MESSAGE, &[], ""));
        assert!(should_add_write_tool(TOOL_CONVERSATIONS_ADD_MESSAGE, &[], "true"));
        assert!(should_add_write_tool(TOOL_CONVERSATIONS_ADD_MESSAGE, &[], "C123,C456"));
        assert!(should_add_write_tool(
            TOOL_CONVERSATIONS_ADD_MESSAGE,
            &list(&[TOOL_CONVERSATIONS_ADD_MESSAGE]),
            ""
        ));
        assert!(should_add_write_tool(
            TOOL_CONVERSATIONS_ADD_MESSAGE,
            &list(&[TOOL_CONVERSATIONS_ADD_MESSAGE]),
            "C123"
        ));
        assert!(!should_add_write_tool(
            TOOL_CONVERSATIONS_ADD_MESSAGE,
            &list(&[TOOL_CONVERSATIONS_HISTORY]),
            "true"
        ));
    }

    #[test]
    fn validate_rejects_unknown_names() {
        assert!(validate_enabled_tools(&[]).is_ok());
        assert!(validate_enabled_tools(&list(VALID_TOOL_NAMES)).is_ok());

        let err = validate_enabled_tools(&list(&["channel_list"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("channel_list"));
        assert!(msg.contains("Valid tools are:"));

        let err = validate_enabled_tools(&list(&["foo", TOOL_CHANNELS_LIST, "bar"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains("bar"));
    }

    #[test]
    fn channel_policy_allow_everything() {
        assert!(is_channel_allowed_for_config("C1", ""));
        assert!(is_channel_allowed_for_config("C1", "true"));
        assert!(is_channel_allowed_for_config("C1", "1"));
    }

    #[test]
    fn channel_policy_allowlist() {
        assert!(is_channel_allowed_for_config("C1", "C1,C2"));
        assert!(is_channel_allowed_for_config("C2", "C1,C2"));
        assert!(!is_channel_allowed_for_config("C3", "C1,C2"));
        assert!(is_channel_allowed_for_config("C2", "C1, C2"));
    }

    #[test]
    fn channel_policy_blocklist() {
        assert!(!is_channel_allowed_for_config("C1", "!C1,!C2"));
        assert!(!is_channel_allowed_for_config("C2", "!C1,!C2"));
        assert!(is_channel_allowed_for_config("C3", "!C1,!C2"));
        // Mixed entries evaluate as a blocklist when the first is negated.
        assert!(!is_channel_allowed_for_config("C2", "!C1,C2"));
        assert!(is_channel_allowed_for_config("C3", "!C1,C2"));
    }

    #[test]
    fn definitions_cover_all_registered_names() {
        let defs = tool_definitions(VALID_TOOL_NAMES);
        assert_eq!(defs.len(), VALID_TOOL_NAMES.len());
        for def in &defs {
            assert!(VALID_TOOL_NAMES.iter().any(|v| *v == def.name.as_ref()));
            assert!(def.input_schema.contains_key("type"));
        }
    }
}
