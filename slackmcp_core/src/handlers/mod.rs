//! Tool handlers. Each submodule parses its tool's parameters, invokes
//! the Slack client through the rate-limited call primitive where the
//! call volume warrants it, and emits CSV rows with opaque cursors.

pub mod attachments;
pub mod channels;
pub mod conversations;
pub mod lists;
pub mod reactions;
pub mod unreads;
pub mod usergroups;
pub mod users;

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::Value;

use crate::cache::UsersCache;
use crate::csvout;
use crate::error::ServerError;
use crate::slack::types as wire;
use crate::text;

/// Accessor over a tool call's `arguments` object.
pub(crate) struct Args<'a>(pub Option<&'a serde_json::Map<String, Value>>);

impl Args<'_> {
    pub fn str(&self, key: &str, default: &str) -> String {
        self.0
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.0
            .and_then(|m| m.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn int(&self, key: &str, default: i64) -> i64 {
        let v = match self.0.and_then(|m| m.get(key)) {
            Some(v) => v,
            None => return default,
        };
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(default)
    }
}

pub(crate) fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: None,
        is_error: Some(false),
        meta: None,
    }
}

pub(crate) fn csv_result<T: Serialize>(rows: &[T]) -> Result<CallToolResult, ServerError> {
    Ok(text_result(csvout::to_csv(rows)?))
}

/// One CSV row of message output, shared by history/replies/search/unreads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageRow {
    #[serde(rename = "MsgID")]
    pub msg_id: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "RealName")]
    pub real_name: String,
    #[serde(rename = "ChannelID")]
    pub channel: String,
    #[serde(rename = "ThreadTs")]
    pub thread_ts: String,
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Reactions")]
    pub reactions: String,
    #[serde(rename = "BotName")]
    pub bot_name: String,
    #[serde(rename = "FileCount")]
    pub file_count: usize,
    #[serde(rename = "AttachmentIDs")]
    pub attachment_ids: String,
    #[serde(rename = "HasMedia")]
    pub has_media: bool,
    #[serde(rename = "Cursor")]
    pub cursor: String,
}

fn user_display(user_id: &str, users: &UsersCache) -> (String, String) {
    match users.users.get(user_id) {
        Some(u) => (u.name.clone(), u.real_name.clone()),
        None => (user_id.to_string(), user_id.to_string()),
    }
}

fn has_image_blocks(blocks: &[Value]) -> bool {
    blocks
        .iter()
        .any(|b| b.get("type").and_then(Value::as_str) == Some("image"))
}

/// Whether a message is an activity event (channel_join etc.) rather than
/// content. Bot messages and thread broadcasts count as content.
fn is_activity(subtype: &str) -> bool {
    !subtype.is_empty() && subtype != "bot_message" && subtype != "thread_broadcast"
}

/// Convert history/replies messages to CSV rows. Activity messages are
/// elided unless requested; the user column degrades to the raw ID while
/// the users cache is not ready.
pub(crate) fn convert_messages_from_history(
    messages: &[wire::Message],
    channel: &str,
    include_activity: bool,
    users: &UsersCache,
) -> Vec<MessageRow> {
    let mut rows = Vec::with_capacity(messages.len());
    for msg in messages {
        if is_activity(&msg.subtype) && !include_activity {
            continue;
        }

        let (mut user_name, mut real_name) = user_display(&msg.user, users);
        if msg.user.is_empty() && msg.subtype == "bot_message" && !msg.username.is_empty() {
            user_name = msg.username.clone();
            real_name = msg.username.clone();
        }

        let time = match text::timestamp_to_rfc3339(&msg.ts) {
            Ok(t) => t,
            Err(_) => continue,
        };

        // Block-only messages (common for bots) have an empty text field.
        let base_text = if msg.text.is_empty() && !msg.blocks.is_empty() {
            text::blocks_to_text(&msg.blocks)
        } else {
            msg.text.clone()
        };
        let body = format!(
            "{}{}",
            base_text,
            text::attachments_to_text(&base_text, &msg.attachments)
        );

        let reactions = msg
            .reactions
            .iter()
            .map(|r| format!("{}:{}", r.name, r.count))
            .collect::<Vec<_>>()
            .join("|");

        let attachment_ids = msg
            .files
            .iter()
            .map(|f| f.id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        rows.push(MessageRow {
            msg_id: msg.ts.clone(),
            user_id: msg.user.clone(),
            user_name,
            real_name,
            channel: channel.to_string(),
            thread_ts: msg.thread_ts.clone(),
            text: text::process_text(&body),
            time,
            reactions,
            bot_name: msg
                .bot_profile
                .as_ref()
                .map(|b| b.name.clone())
                .unwrap_or_default(),
            file_count: msg.files.len(),
            attachment_ids,
            has_media: !msg.files.is_empty() || has_image_blocks(&msg.blocks),
            cursor: String::new(),
        });
    }
    rows
}

/// Convert search matches to CSV rows. The thread timestamp is recovered
/// from the permalink's query string.
pub(crate) fn convert_messages_from_search(
    matches: &[wire::SearchMessage],
    users: &UsersCache,
) -> Vec<MessageRow> {
    let mut rows = Vec::with_capacity(matches.len());
    for msg in matches {
        let (mut user_name, mut real_name) = user_display(&msg.user, users);
        if msg.user.is_empty() && !msg.username.is_empty() {
            user_name = msg.username.clone();
            real_name = msg.username.clone();
        }

        let time = match text::timestamp_to_rfc3339(&msg.ts) {
            Ok(t) => t,
            Err(_) => continue,
        };

        let base_text = if msg.text.is_empty() && !msg.blocks.is_empty() {
            text::blocks_to_text(&msg.blocks)
        } else {
            msg.text.clone()
        };
        let body = format!(
            "{}{}",
            base_text,
            text::attachments_to_text(&base_text, &msg.attachments)
        );

        rows.push(MessageRow {
            msg_id: msg.ts.clone(),
            user_id: msg.user.clone(),
            user_name,
            real_name,
            channel: format!("#{}", msg.channel.name),
            thread_ts: thread_ts_from_permalink(&msg.permalink),
            text: text::process_text(&body),
            time,
            has_media: has_image_blocks(&msg.blocks),
            ..Default::default()
        });
    }
    rows
}

fn thread_ts_from_permalink(permalink: &str) -> String {
    url::Url::parse(permalink)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "thread_ts")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: &str, subtype: &str, text: &str) -> wire::Message {
        wire::Message {
            ts: ts.to_string(),
            subtype: subtype.to_string(),
            text: text.to_string(),
            user: "U1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn activity_messages_elided_by_default() {
        let users = UsersCache::default();
        let messages = vec![
            msg("1736510400.000100", "", "hello"),
            msg("1736510401.000100", "channel_join", "joined"),
            msg("1736510402.000100", "thread_broadcast", "bcast"),
        ];
        let rows = convert_messages_from_history(&messages, "#general", false, &users);
        assert_eq!(rows.len(), 2);

        let rows = convert_messages_from_history(&messages, "#general", true, &users);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn unresolved_user_degrades_to_raw_id() {
        let users = UsersCache::default();
        let rows =
            convert_messages_from_history(&[msg("1736510400.000100", "", "x")], "#g", false, &users);
        assert_eq!(rows[0].user_name, "U1");
        assert_eq!(rows[0].real_name, "U1");
    }

    #[test]
    fn bot_message_uses_username() {
        let users = UsersCache::default();
        let mut m = msg("1736510400.000100", "bot_message", "beep");
        m.user = String::new();
        m.username = "deploybot".to_string();
        let rows = convert_messages_from_history(&[m], "#g", false, &users);
        assert_eq!(rows[0].user_name, "deploybot");
    }

    #[test]
    fn reactions_joined_with_pipes() {
        let users = UsersCache::default();
        let mut m = msg("1736510400.000100", "", "x");
        m.reactions = vec![
            wire::Reaction {
                name: "thumbsup".into(),
                count: 3,
            },
            wire::Reaction {
                name: "eyes".into(),
                count: 1,
            },
        ];
        let rows = convert_messages_from_history(&[m], "#g", false, &users);
        assert_eq!(rows[0].reactions, "thumbsup:3|eyes:1");
    }

    #[test]
    fn thread_ts_recovered_from_permalink() {
        assert_eq!(
            thread_ts_from_permalink(
                "https://t.slack.com/archives/C1/p17365?thread_ts=1736510400.000100&cid=C1"
            ),
            "1736510400.000100"
        );
        assert_eq!(thread_ts_from_permalink("not a url"), "");
    }

    #[test]
    fn block_only_message_renders_block_text() {
        let users = UsersCache::default();
        let mut m = msg("1736510400.000100", "bot_message", "");
        m.blocks = vec![serde_json::json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": "Deploy finished"}
        })];
        let rows = convert_messages_from_history(&[m], "#g", false, &users);
        assert_eq!(rows[0].text, "Deploy finished");
    }

    #[test]
    fn timestamps_rendered_rfc3339() {
        let users = UsersCache::default();
        let rows = convert_messages_from_history(
            &[msg("1736510400.000100", "", "x")],
            "#g",
            false,
            &users,
        );
        assert_eq!(rows[0].time, "2025-01-10T12:00:00Z");
        assert_eq!(rows[0].msg_id, "1736510400.000100", "ts preserved verbatim");
    }
}
