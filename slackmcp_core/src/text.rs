//! Text utilities shared by the handlers: Slack timestamp conversion,
//! workspace extraction, CSV-friendly text normalisation and the unfurl
//! allowlist policy.

use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use url::Url;

use crate::error::ServerError;

/// Convert a Slack `"<seconds>.<microseconds>"` timestamp to RFC 3339.
pub fn timestamp_to_rfc3339(ts: &str) -> Result<String, ServerError> {
    let (secs_str, micros_str) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs_str
        .parse()
        .map_err(|_| ServerError::InvalidInput(format!("invalid Slack timestamp: {:?}", ts)))?;
    let micros: u32 = micros_str
        .parse()
        .map_err(|_| ServerError::InvalidInput(format!("invalid Slack timestamp: {:?}", ts)))?;
    if micros > 999_999 {
        return Err(ServerError::InvalidInput(format!(
            "invalid Slack timestamp: {:?}",
            ts
        )));
    }
    let dt = Utc
        .timestamp_opt(secs, micros * 1000)
        .single()
        .ok_or_else(|| ServerError::InvalidInput(format!("Slack timestamp out of range: {:?}", ts)))?;
    Ok(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

/// Extract the workspace subdomain from an auth.test team URL,
/// e.g. `https://myteam.slack.com/` -> `myteam`.
pub fn workspace(team_url: &str) -> Result<String, ServerError> {
    let url = Url::parse(team_url)
        .map_err(|e| ServerError::InvalidInput(format!("invalid team URL {:?}: {}", team_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ServerError::InvalidInput(format!("team URL has no host: {:?}", team_url)))?;
    match host.split('.').next() {
        Some(sub) if !sub.is_empty() => Ok(sub.to_string()),
        _ => Err(ServerError::InvalidInput(format!(
            "cannot extract workspace from {:?}",
            team_url
        ))),
    }
}

/// Normalise message text for CSV rows: unify line endings and strip
/// trailing whitespace. Newlines themselves survive (the CSV writer
/// quotes them).
pub fn process_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

/// Fold attachment titles/bodies into the message text the way the web
/// client renders unfurls, skipping parts already present in the text.
pub fn attachments_to_text(text: &str, attachments: &[crate::slack::types::Attachment]) -> String {
    let mut out = String::new();
    for a in attachments {
        for part in [&a.title, &a.text, &a.fallback] {
            if !part.is_empty() && !text.contains(part.as_str()) && !out.contains(part.as_str()) {
                out.push('\n');
                out.push_str(part);
            }
        }
    }
    out
}

/// Extract readable text from a message's Block Kit payload. Used when a
/// message (typically a bot's) carries blocks but no plain `text`.
/// Handles header, section (text + fields), context and rich_text blocks;
/// anything else contributes nothing.
pub fn blocks_to_text(blocks: &[serde_json::Value]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for block in blocks {
        match block.get("type").and_then(serde_json::Value::as_str) {
            Some("header") | Some("section") => {
                if let Some(t) = block.pointer("/text/text").and_then(serde_json::Value::as_str) {
                    if !t.is_empty() {
                        parts.push(t.to_string());
                    }
                }
                if let Some(fields) = block.get("fields").and_then(serde_json::Value::as_array) {
                    for field in fields {
                        if let Some(t) = field.get("text").and_then(serde_json::Value::as_str) {
                            if !t.is_empty() {
                                parts.push(t.to_string());
                            }
                        }
                    }
                }
            }
            Some("context") => {
                if let Some(elements) = block.get("elements").and_then(serde_json::Value::as_array)
                {
                    for el in elements {
                        if let Some(t) = el.get("text").and_then(serde_json::Value::as_str) {
                            if !t.is_empty() {
                                parts.push(t.to_string());
                            }
                        }
                    }
                }
            }
            Some("rich_text") => {
                let mut buf = String::new();
                collect_rich_text(block, &mut buf);
                if !buf.is_empty() {
                    parts.push(buf);
                }
            }
            _ => {}
        }
    }
    parts.join(" ")
}

/// Rich-text blocks nest arbitrarily (sections, lists, quotes); walk the
/// element tree collecting `text` leaves and link URLs.
fn collect_rich_text(node: &serde_json::Value, out: &mut String) {
    if let Some(elements) = node.get("elements").and_then(serde_json::Value::as_array) {
        for el in elements {
            match el.get("type").and_then(serde_json::Value::as_str) {
                Some("text") | Some("emoji") => {
                    if let Some(t) = el.get("text").and_then(serde_json::Value::as_str) {
                        out.push_str(t);
                    } else if let Some(name) = el.get("name").and_then(serde_json::Value::as_str) {
                        out.push(':');
                        out.push_str(name);
                        out.push(':');
                    }
                }
                Some("link") => {
                    match el.get("text").and_then(serde_json::Value::as_str) {
                        Some(t) if !t.is_empty() => out.push_str(t),
                        _ => {
                            if let Some(url) = el.get("url").and_then(serde_json::Value::as_str) {
                                out.push_str(url);
                            }
                        }
                    }
                }
                Some("user") => {
                    if let Some(id) = el.get("user_id").and_then(serde_json::Value::as_str) {
                        out.push_str("<@");
                        out.push_str(id);
                        out.push('>');
                    }
                }
                Some("channel") => {
                    if let Some(id) = el.get("channel_id").and_then(serde_json::Value::as_str) {
                        out.push_str("<#");
                        out.push_str(id);
                        out.push('>');
                    }
                }
                _ => collect_rich_text(el, out),
            }
        }
    }
}

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>|]+").expect("url regex"));

/// Decide whether link unfurling is allowed for a message.
///
/// Policy values: empty -> unfurling off; `true`/`1`/`yes` -> always on;
/// otherwise a comma-separated host allowlist. Any URL whose host is not
/// listed disables unfurling for the whole message (conservative: one
/// unknown host poisons the post).
pub fn is_unfurling_enabled(text: &str, policy: &str) -> bool {
    let policy = policy.trim();
    if policy.is_empty() {
        return false;
    }
    if crate::config::is_truthy(policy) {
        return true;
    }

    let allowed: Vec<&str> = policy
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for m in URL_RE.find_iter(text) {
        let host = match Url::parse(m.as_str()).ok().and_then(|u| u.host_str().map(String::from)) {
            Some(h) => h,
            None => continue,
        };
        let ok = allowed
            .iter()
            .any(|a| host == *a || host.ends_with(&format!(".{}", a)));
        if !ok {
            warn!(host = %host, "URL host not in unfurl allowlist; disabling unfurling");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_conversion() {
        assert_eq!(
            timestamp_to_rfc3339("1736510400.000000").unwrap(),
            "2025-01-10T12:00:00Z"
        );
        assert!(timestamp_to_rfc3339("garbage").is_err());
    }

    #[test]
    fn workspace_extraction() {
        assert_eq!(workspace("https://myteam.slack.com/").unwrap(), "myteam");
        assert_eq!(
            workspace("https://acme.enterprise.slack.com").unwrap(),
            "acme"
        );
        assert!(workspace("not a url").is_err());
    }

    #[test]
    fn unfurl_policy() {
        assert!(!is_unfurling_enabled("see https://evil.example", ""));
        assert!(is_unfurling_enabled("see https://evil.example", "true"));
        assert!(is_unfurling_enabled(
            "see https://docs.rs/tokio",
            "docs.rs,github.com"
        ));
        assert!(!is_unfurling_enabled(
            "see https://docs.rs and https://evil.example",
            "docs.rs"
        ));
        assert!(is_unfurling_enabled("no links at all", "docs.rs"));
        // Subdomains of an allowed host pass.
        assert!(is_unfurling_enabled(
            "https://gist.github.com/x",
            "github.com"
        ));
    }

    #[test]
    fn text_processing() {
        assert_eq!(process_text("a\r\nb  \n"), "a\nb");
    }

    #[test]
    fn blocks_to_text_empty() {
        assert_eq!(blocks_to_text(&[]), "");
    }

    #[test]
    fn blocks_to_text_header_and_section() {
        let blocks = vec![
            serde_json::json!({
                "type": "header",
                "text": {"type": "plain_text", "text": "Important Header"}
            }),
            serde_json::json!({
                "type": "section",
                "text": {"type": "mrkdwn", "text": "Main text"},
                "fields": [
                    {"type": "mrkdwn", "text": "Field 1"},
                    {"type": "mrkdwn", "text": "Field 2"}
                ]
            }),
        ];
        assert_eq!(blocks_to_text(&blocks), "Important Header Main text Field 1 Field 2");
    }

    #[test]
    fn blocks_to_text_context() {
        let blocks = vec![serde_json::json!({
            "type": "context",
            "elements": [{"type": "mrkdwn", "text": "context info"}]
        })];
        assert_eq!(blocks_to_text(&blocks), "context info");
    }

    #[test]
    fn blocks_to_text_rich_text() {
        let blocks = vec![serde_json::json!({
            "type": "rich_text",
            "elements": [{
                "type": "rich_text_section",
                "elements": [
                    {"type": "text", "text": "Hello "},
                    {"type": "text", "text": "World"}
                ]
            }]
        })];
        assert_eq!(blocks_to_text(&blocks), "Hello World");
    }

    #[test]
    fn blocks_to_text_rich_text_link_and_refs() {
        let blocks = vec![serde_json::json!({
            "type": "rich_text",
            "elements": [{
                "type": "rich_text_section",
                "elements": [
                    {"type": "text", "text": "see "},
                    {"type": "link", "url": "https://docs.rs", "text": "the docs"},
                    {"type": "text", "text": " cc "},
                    {"type": "user", "user_id": "U1"}
                ]
            }]
        })];
        assert_eq!(blocks_to_text(&blocks), "see the docs cc <@U1>");
    }
}
