//! Channel directory tools: `channels_list` and `channel_members_list`.
//! Both serve from the workspace cache where possible and paginate with a
//! base64 last-seen-ID cursor.

use std::sync::Arc;

use base64::Engine;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde::Serialize;
use tracing::{debug, warn};

use super::{csv_result, Args};
use crate::auth::AuthContext;
use crate::cache::CachedChannel;
use crate::error::ServerError;
use crate::provider::Provider;

const VALID_CHANNEL_TYPES: &[&str] = &["public_channel", "private_channel", "im", "mpim"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Topic")]
    pub topic: String,
    #[serde(rename = "Purpose")]
    pub purpose: String,
    #[serde(rename = "MemberCount")]
    pub member_count: i64,
    #[serde(rename = "Cursor")]
    pub cursor: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelMemberRow {
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "RealName")]
    pub real_name: String,
    #[serde(rename = "IsBot")]
    pub is_bot: bool,
    #[serde(rename = "Cursor")]
    pub cursor: String,
}

pub struct ChannelsHandler {
    provider: Arc<Provider>,
}

impl ChannelsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn channels_list(
        &self,
        _auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        self.provider.is_ready()?;
        let args = Args(request.arguments.as_ref());

        let sort = args.str("sort", "popularity");
        let types_arg = args.str("channel_types", "public_channel");
        let cursor = args.str("cursor", "");
        let mut limit = args.int("limit", 0);

        let mut types: Vec<&str> = types_arg
            .split(',')
            .map(str::trim)
            .filter(|t| {
                let valid = VALID_CHANNEL_TYPES.iter().any(|v| v == t);
                if !valid && !t.is_empty() {
                    warn!(channel_type = t, "invalid channel type ignored");
                }
                valid
            })
            .collect();
        if types.is_empty() {
            types = vec!["public_channel", "private_channel"];
        }

        if limit == 0 {
            limit = 100;
        }
        if limit > 999 {
            limit = 999;
        }

        let snapshot = self.provider.channels_snapshot().await;
        let filtered: Vec<&CachedChannel> = snapshot
            .channels
            .values()
            .filter(|ch| channel_matches_types(ch, &types))
            .collect();
        debug!(total = snapshot.channels.len(), filtered = filtered.len(), "channels_list");

        let (page, next_cursor) = paginate_by_id(filtered, &cursor, limit as usize, |ch| &ch.id);

        let mut rows: Vec<ChannelRow> = page
            .into_iter()
            .map(|ch| ChannelRow {
                id: ch.id.clone(),
                name: ch.name.clone(),
                topic: ch.topic.clone(),
                purpose: ch.purpose.clone(),
                member_count: ch.member_count,
                cursor: String::new(),
            })
            .collect();

        if sort == "popularity" {
            rows.sort_by(|a, b| b.member_count.cmp(&a.member_count));
        }

        if let (Some(last), false) = (rows.last_mut(), next_cursor.is_empty()) {
            last.cursor = next_cursor;
        }
        csv_result(&rows)
    }

    pub async fn channel_members_list(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());

        let channel = args.str("channel_id", "");
        if channel.is_empty() {
            return Err(ServerError::InvalidParams("channel_id must be a string".into()));
        }
        let channel_id = self.provider.resolve_channel_id(&channel).await?;

        let include_bots = args.bool("include_bots", false);
        let mut limit = args.int("limit", 100);
        if !(1..=1000).contains(&limit) {
            limit = 100;
        }
        let cursor = args.str("cursor", "");

        // The member list itself is fetched in full (paginating the Slack
        // side), then paged locally by user ID for a stable cursor.
        let mut member_ids: Vec<String> = Vec::new();
        let mut api_cursor = String::new();
        loop {
            let page = client.users_in_conversation(&channel_id, &api_cursor).await?;
            member_ids.extend(page.members);
            api_cursor = page.response_metadata.next_cursor;
            if api_cursor.is_empty() {
                break;
            }
        }
        debug!(channel = %channel_id, count = member_ids.len(), "channel members fetched");

        let users = self.provider.users_snapshot().await;
        let mut members: Vec<ChannelMemberRow> = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            match users.users.get(id) {
                Some(u) => {
                    if u.is_bot && !include_bots {
                        continue;
                    }
                    members.push(ChannelMemberRow {
                        user_id: u.id.clone(),
                        user_name: u.name.clone(),
                        real_name: u.real_name.clone(),
                        is_bot: u.is_bot,
                        cursor: String::new(),
                    });
                }
                None => {
                    // Degrade to the raw ID while the users cache syncs.
                    members.push(ChannelMemberRow {
                        user_id: id.clone(),
                        user_name: id.clone(),
                        real_name: id.clone(),
                        is_bot: false,
                        cursor: String::new(),
                    });
                }
            }
        }

        let member_refs: Vec<&ChannelMemberRow> = members.iter().collect();
        let (page, next_cursor) =
            paginate_by_id(member_refs, &cursor, limit as usize, |m| &m.user_id);
        let mut rows: Vec<ChannelMemberRow> = page.into_iter().cloned().collect();
        if let (Some(last), false) = (rows.last_mut(), next_cursor.is_empty()) {
            last.cursor = next_cursor;
        }
        csv_result(&rows)
    }
}

fn channel_matches_types(ch: &CachedChannel, types: &[&str]) -> bool {
    for t in types {
        let matched = match *t {
            "public_channel" => !ch.is_private && !ch.is_im && !ch.is_mpim,
            "private_channel" => ch.is_private && !ch.is_im && !ch.is_mpim,
            "im" => ch.is_im,
            "mpim" => ch.is_mpim,
            _ => false,
        };
        if matched {
            return true;
        }
    }
    false
}

/// Sort by ID, resume after the cursor's decoded ID, emit the cursor of
/// the last returned row when more remain.
fn paginate_by_id<'a, T, F>(
    mut items: Vec<&'a T>,
    cursor: &str,
    limit: usize,
    id_of: F,
) -> (Vec<&'a T>, String)
where
    F: Fn(&T) -> &String,
{
    items.sort_by(|a, b| id_of(a).cmp(id_of(b)));

    let mut start = 0;
    if !cursor.is_empty() {
        if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(cursor) {
            if let Ok(last_id) = String::from_utf8(decoded) {
                start = items
                    .iter()
                    .position(|item| id_of(item).as_str() > last_id.as_str())
                    .unwrap_or(items.len());
            }
        } else {
            warn!(cursor, "failed to decode pagination cursor; starting from the top");
        }
    }

    let end = (start + limit).min(items.len());
    let page = items[start..end].to_vec();
    let next_cursor = if end < items.len() {
        base64::engine::general_purpose::STANDARD.encode(id_of(items[end - 1]))
    } else {
        String::new()
    };
    (page, next_cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(id: &str, is_private: bool, is_im: bool, is_mpim: bool) -> CachedChannel {
        CachedChannel {
            id: id.to_string(),
            name: format!("#{}", id.to_lowercase()),
            is_private,
            is_im,
            is_mpim,
            ..Default::default()
        }
    }

    #[test]
    fn type_filtering() {
        let public = cached("C1", false, false, false);
        let private = cached("G1", true, false, false);
        let im = cached("D1", false, true, false);
        let mpim = cached("G2", false, false, true);

        assert!(channel_matches_types(&public, &["public_channel"]));
        assert!(!channel_matches_types(&public, &["private_channel"]));
        assert!(channel_matches_types(&private, &["private_channel"]));
        assert!(channel_matches_types(&im, &["im"]));
        assert!(channel_matches_types(&mpim, &["mpim"]));
        assert!(channel_matches_types(&im, &["public_channel", "im"]));
    }

    #[test]
    fn pagination_walks_the_full_set() {
        let channels: Vec<CachedChannel> = (1..=5)
            .map(|i| cached(&format!("C{}", i), false, false, false))
            .collect();
        let refs: Vec<&CachedChannel> = channels.iter().collect();

        let (page1, cur1) = paginate_by_id(refs.clone(), "", 2, |c| &c.id);
        assert_eq!(page1.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["C1", "C2"]);
        assert!(!cur1.is_empty());

        let (page2, cur2) = paginate_by_id(refs.clone(), &cur1, 2, |c| &c.id);
        assert_eq!(page2.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["C3", "C4"]);

        let (page3, cur3) = paginate_by_id(refs, &cur2, 2, |c| &c.id);
        assert_eq!(page3.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["C5"]);
        assert!(cur3.is_empty(), "last page carries no cursor");
    }

    #[test]
    fn bad_cursor_starts_from_the_top() {
        let channels = vec![cached("C1", false, false, false)];
        let refs: Vec<&CachedChannel> = channels.iter().collect();
        let (page, _) = paginate_by_id(refs, "!!!", 10, |c| &c.id);
        assert_eq!(page.len(), 1);
    }
}
