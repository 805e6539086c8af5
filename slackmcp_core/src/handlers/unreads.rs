//! Unread discovery across the workspace.
//!
//! Two strategies, gated on token kind. Browser-session tokens get the
//! whole picture from a single edge `client.counts` call. OAuth user
//! tokens have no such endpoint, so membership is enumerated through
//! `users.conversations` and each candidate channel is probed with
//! `conversations.info` / `conversations.history` under a fixed API-call
//! budget. Bot tokens are rejected: unreads are a user-level concept.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{convert_messages_from_history, csv_result, text_result, Args, MessageRow};
use crate::auth::AuthContext;
use crate::cache::{ChannelsCache, UsersCache};
use crate::csvout;
use crate::error::ServerError;
use crate::limiter::{call_with_retry, slack_retry_after, Tier};
use crate::provider::Provider;
use crate::slack::types as wire;
use crate::slack::{HistoryParams, SlackClient};

/// How many messages the count backfill reads past last_read. The exact
/// count matters less than surfacing that unreads exist.
const BACKFILL_LIMIT: u32 = 20;

/// Slack's "never read" sentinel on last_read.
const NEVER_READ_SENTINEL: &str = "0000000000.000000";

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnreadChannelRow {
    #[serde(rename = "ChannelID")]
    pub channel_id: String,
    #[serde(rename = "ChannelName")]
    pub channel_name: String,
    #[serde(rename = "ChannelType")]
    pub channel_type: String,
    #[serde(rename = "UnreadCount")]
    pub unread_count: i64,
    #[serde(rename = "LastRead")]
    pub last_read: String,
    #[serde(rename = "Latest")]
    pub latest: String,
}

#[derive(Debug, Clone)]
pub(crate) struct UnreadsParams {
    pub include_messages: bool,
    pub channel_types: String,
    pub max_channels: usize,
    pub max_messages_per_channel: u32,
    pub mentions_only: bool,
    pub include_muted: bool,
}

impl UnreadsParams {
    fn parse(args: &Args<'_>) -> UnreadsParams {
        UnreadsParams {
            include_messages: args.bool("include_messages", true),
            channel_types: args.str("channel_types", "all"),
            max_channels: args.int("max_channels", 50).max(1) as usize,
            max_messages_per_channel: args.int("max_messages_per_channel", 10).max(1) as u32,
            mentions_only: args.bool("mentions_only", false),
            include_muted: args.bool("include_muted", false),
        }
    }
}

/// dm < group_dm < partner < internal. The sort is stable, so channels of
/// the same type keep their API ordering.
pub(crate) fn channel_priority(channel_type: &str) -> u8 {
    match channel_type {
        "dm" => 0,
        "group_dm" => 1,
        "partner" => 2,
        _ => 3,
    }
}

pub struct UnreadsHandler {
    provider: Arc<Provider>,
}

impl UnreadsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn unreads(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let args = Args(request.arguments.as_ref());
        let params = UnreadsParams::parse(&args);

        // The mute filter only applies when the muted set is fetchable;
        // its absence is reported in the output, not treated as an error.
        let mut muted: HashMap<String, bool> = HashMap::new();
        let mut muted_unavailable = false;
        if !params.include_muted {
            match client.get_muted_channels().await {
                Ok(m) => {
                    debug!(count = m.len(), "loaded muted channels");
                    muted = m;
                }
                Err(e) => {
                    warn!(error = %e, "muted channels unavailable; proceeding without mute filter");
                    muted_unavailable = true;
                }
            }
        }

        if client.is_oauth() {
            if client.is_bot_token() {
                return Err(ServerError::UnsupportedByToken(
                    "conversations_unreads requires a user token (xoxp) or browser session tokens \
                     (xoxc/xoxd); bot tokens (xoxb) do not support unread tracking"
                        .into(),
                ));
            }
            info!("OAuth token detected, using users.conversations fallback for unreads");
            return self
                .unreads_via_conversations_info(&client, &params, &muted, muted_unavailable)
                .await;
        }

        let counts = client.client_counts().await?;
        self.process_client_counts(&client, &params, &muted, counts).await
    }

    /// Edge strategy: one client.counts call plus a count backfill for
    /// channels where Slack only reports has_unreads without a number.
    async fn process_client_counts(
        &self,
        client: &Arc<SlackClient>,
        params: &UnreadsParams,
        muted: &HashMap<String, bool>,
        counts: wire::ClientCountsResponse,
    ) -> Result<CallToolResult, ServerError> {
        debug!(
            channels = counts.channels.len(),
            mpims = counts.mpims.len(),
            ims = counts.ims.len(),
            "client.counts returned"
        );

        let users = self.provider.users_snapshot().await;
        let channels = self.provider.channels_snapshot().await;
        let mut unread = select_from_counts(&counts, params, muted, &users, &channels);

        // Backfill real counts where client.counts only said "has unreads".
        // conversations.info does not return unread_count for browser
        // tokens, so count messages since last_read instead.
        for row in unread.iter_mut() {
            if row.unread_count > 0 {
                continue;
            }
            if row.last_read.is_empty() {
                // Cannot bound the query; report one unread conservatively.
                row.unread_count = 1;
                continue;
            }
            let history = client
                .conversation_history(&HistoryParams {
                    channel: row.channel_id.clone(),
                    oldest: row.last_read.clone(),
                    limit: BACKFILL_LIMIT,
                    ..Default::default()
                })
                .await;
            match history {
                Ok(h) if !h.messages.is_empty() => row.unread_count = h.messages.len() as i64,
                Ok(_) => {}
                Err(e) => {
                    debug!(channel = %row.channel_id, error = %e, "unread count backfill failed");
                }
            }
        }

        if !params.include_messages {
            return csv_result(&unread);
        }

        let mut all_messages: Vec<MessageRow> = Vec::new();
        for row in unread.iter_mut() {
            let history = client
                .conversation_history(&HistoryParams {
                    channel: row.channel_id.clone(),
                    oldest: row.last_read.clone(),
                    limit: params.max_messages_per_channel,
                    ..Default::default()
                })
                .await;
            let history = match history {
                Ok(h) => h,
                Err(e) => {
                    warn!(channel = %row.channel_id, error = %e, "failed to fetch unread messages");
                    continue;
                }
            };
            row.unread_count = history.messages.len() as i64;
            all_messages.extend(convert_messages_from_history(
                &history.messages,
                &row.channel_name,
                false,
                &users,
            ));
        }
        debug!(total = all_messages.len(), "fetched unread messages");
        csv_result(&all_messages)
    }

    /// OAuth fallback: enumerate membership per type group under a fixed
    /// budget, probing each candidate for unreads.
    async fn unreads_via_conversations_info(
        &self,
        client: &Arc<SlackClient>,
        params: &UnreadsParams,
        muted: &HashMap<String, bool>,
        muted_unavailable: bool,
    ) -> Result<CallToolResult, ServerError> {
        let users = self.provider.users_snapshot().await;

        // DMs get the full budget; MPIMs and channels half each. Each
        // group scans at most max(budget * 2, 50) channels, so the whole
        // operation is bounded at roughly 2 API calls per scanned channel.
        let groups = [
            TypeGroup {
                slack_types: "im",
                channel_type: "dm",
                budget: params.max_channels,
                is_dm: true,
            },
            TypeGroup {
                slack_types: "mpim",
                channel_type: "group_dm",
                budget: params.max_channels / 2,
                is_dm: false,
            },
            TypeGroup {
                slack_types: "public_channel,private_channel",
                channel_type: "",
                budget: params.max_channels / 2,
                is_dm: false,
            },
        ];

        let mut unread: Vec<UnreadChannelRow> = Vec::new();
        let mut total_api_calls = 0usize;
        let mut total_scanned = 0usize;
        let mut total_rate_limited = 0usize;

        for group in &groups {
            if params.channel_types != "all" {
                let matches = match params.channel_types.as_str() {
                    "dm" => group.channel_type == "dm",
                    "group_dm" => group.channel_type == "group_dm",
                    // internal and partner both come out of the channels group
                    "internal" | "partner" => group.channel_type.is_empty(),
                    _ => false,
                };
                if !matches {
                    continue;
                }
            }

            let scan = self
                .scan_type_group(client, params, &users, muted, group)
                .await;
            unread.extend(scan.found);
            total_api_calls += scan.api_calls;
            total_scanned += scan.scanned;
            total_rate_limited += scan.rate_limited;
        }

        unread.sort_by_key(|row| channel_priority(&row.channel_type));

        info!(
            count = unread.len(),
            scanned = total_scanned,
            api_calls = total_api_calls,
            rate_limited = total_rate_limited,
            "unread channels found via xoxp fallback"
        );

        let muted_note = if muted_unavailable && !params.include_muted {
            "Muted channel filtering is unavailable with xoxp tokens; results may include muted channels. "
        } else {
            ""
        };
        let rate_limit_note = if total_rate_limited > 0 {
            format!(
                "WARNING: {} channels were skipped due to Slack rate limiting (even after retries) — \
                 results are degraded. Try again after a brief cooldown. ",
                total_rate_limited
            )
        } else {
            String::new()
        };
        let note = format!(
            "[xoxp token: scanned {} channels ({} API calls), found {} with unreads. {}{}\
             Results may be incomplete — increase max_channels for broader coverage, \
             or use xoxc/xoxd browser tokens for complete results.]\n\n",
            total_scanned,
            total_api_calls,
            unread.len(),
            rate_limit_note,
            muted_note,
        );

        if !params.include_messages {
            let csv = csvout::to_csv(&unread)?;
            return Ok(text_result(format!("{}{}", note, csv)));
        }

        let limiter = Tier::Tier3.limiter();
        let mut all_messages: Vec<MessageRow> = Vec::new();
        for row in &unread {
            let history_params = HistoryParams {
                channel: row.channel_id.clone(),
                oldest: row.last_read.clone(),
                limit: params.max_messages_per_channel,
                ..Default::default()
            };
            let result = call_with_retry(&limiter, 2, slack_retry_after, || {
                let client = client.clone();
                let hp = history_params.clone();
                async move { client.conversation_history(&hp).await }
            })
            .await;
            match result {
                Ok(history) => {
                    all_messages.extend(convert_messages_from_history(
                        &history.messages,
                        &row.channel_name,
                        false,
                        &users,
                    ));
                }
                Err(e) => {
                    warn!(channel = %row.channel_id, error = %e, "failed to fetch unread messages");
                }
            }
        }

        let csv = csvout::to_csv(&all_messages)?;
        Ok(text_result(format!("{}{}", note, csv)))
    }

    async fn scan_type_group(
        &self,
        client: &Arc<SlackClient>,
        params: &UnreadsParams,
        users: &UsersCache,
        muted: &HashMap<String, bool>,
        group: &TypeGroup,
    ) -> ScanResult {
        let mut result = ScanResult::default();
        let limiter = Tier::Tier3.limiter();

        // users.conversations returns channels in creation order, not by
        // activity, so unread channels can appear anywhere in the list.
        let max_scan = (group.budget * 2).max(50);

        let mut cursor = String::new();
        'pages: loop {
            if result.found.len() >= group.budget || result.scanned >= max_scan {
                break;
            }

            let page = call_with_retry(&limiter, 2, slack_retry_after, || {
                let client = client.clone();
                let cur = cursor.clone();
                let types = group.slack_types;
                async move { client.conversations_for_user(types, &cur).await }
            })
            .await;
            result.api_calls += 1;
            let page = match page {
                Ok(p) => p,
                Err(e) => {
                    warn!(types = group.slack_types, error = %e, "users.conversations failed");
                    break;
                }
            };
            if page.channels.is_empty() {
                break;
            }

            for channel in &page.channels {
                if result.found.len() >= group.budget || result.scanned >= max_scan {
                    break 'pages;
                }
                if muted.get(&channel.id).copied().unwrap_or(false) {
                    continue;
                }
                result.scanned += 1;

                let info = call_with_retry(&limiter, 2, slack_retry_after, || {
                    let client = client.clone();
                    let id = channel.id.clone();
                    async move { client.conversation_info(&id).await }
                })
                .await;
                result.api_calls += 1;
                let info = match info {
                    Ok(i) => i,
                    Err(ServerError::RateLimited(_)) => {
                        result.rate_limited += 1;
                        warn!(channel = %channel.id, "rate limited on conversations.info (retries exhausted)");
                        continue;
                    }
                    Err(e) => {
                        debug!(channel = %channel.id, error = %e, "conversations.info failed");
                        continue;
                    }
                };

                let mut unread_count: i64 = 0;
                let mut has_unreads = false;

                if group.is_dm {
                    // DMs report unread_count directly on conversations.info.
                    if info.unread_count > 0 {
                        has_unreads = true;
                        unread_count = info.unread_count;
                    }
                } else {
                    // Non-DMs report last_read but no unread_count for
                    // OAuth tokens. last_read values:
                    //   ""                  -> never visited
                    //   "0000000000.000000" -> never read (sentinel)
                    //   "<timestamp>"       -> last read position
                    let never_visited =
                        info.last_read.is_empty() || info.last_read == NEVER_READ_SENTINEL;

                    if never_visited && group.channel_type != "group_dm" {
                        // Dormant auto-joined channels would flood the
                        // results; MPIMs are always intentional, so probe those.
                        continue;
                    }

                    let oldest = if never_visited {
                        "0".to_string()
                    } else {
                        info.last_read.clone()
                    };

                    let history = call_with_retry(&limiter, 2, slack_retry_after, || {
                        let client = client.clone();
                        let id = channel.id.clone();
                        let oldest = oldest.clone();
                        let limit = params.max_messages_per_channel;
                        async move {
                            client
                                .conversation_history(&HistoryParams {
                                    channel: id,
                                    oldest,
                                    limit,
                                    ..Default::default()
                                })
                                .await
                        }
                    })
                    .await;
                    result.api_calls += 1;
                    match history {
                        Ok(h) if !h.messages.is_empty() => {
                            has_unreads = true;
                            unread_count = h.messages.len() as i64;
                        }
                        Ok(_) => {}
                        Err(ServerError::RateLimited(_)) => {
                            result.rate_limited += 1;
                            warn!(channel = %channel.id, "rate limited on conversations.history (retries exhausted)");
                        }
                        Err(e) => {
                            debug!(channel = %channel.id, error = %e, "history probe failed");
                        }
                    }
                }

                if !has_unreads {
                    continue;
                }

                let channel_type = if group.channel_type.is_empty() {
                    if info.is_ext_shared {
                        "partner"
                    } else {
                        "internal"
                    }
                } else {
                    group.channel_type
                };
                if params.channel_types != "all" && params.channel_types != channel_type {
                    continue;
                }

                result.found.push(UnreadChannelRow {
                    channel_id: channel.id.clone(),
                    channel_name: display_name_from_info(&info, channel_type, users),
                    channel_type: channel_type.to_string(),
                    unread_count,
                    last_read: info.last_read.clone(),
                    latest: info.latest.as_ref().map(|m| m.ts.clone()).unwrap_or_default(),
                });
            }

            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }

        debug!(
            types = group.slack_types,
            scanned = result.scanned,
            found = result.found.len(),
            api_calls = result.api_calls,
            rate_limited = result.rate_limited,
            "type group scan complete"
        );
        result
    }
}

struct TypeGroup {
    slack_types: &'static str,
    channel_type: &'static str,
    budget: usize,
    is_dm: bool,
}

#[derive(Default)]
struct ScanResult {
    found: Vec<UnreadChannelRow>,
    api_calls: usize,
    scanned: usize,
    rate_limited: usize,
}

fn display_name_from_info(info: &wire::Channel, channel_type: &str, users: &UsersCache) -> String {
    match channel_type {
        "dm" => {
            if !info.user.is_empty() {
                match users.users.get(&info.user) {
                    Some(u) => format!("@{}", u.name),
                    None => format!("@{}", info.user),
                }
            } else {
                info.id.clone()
            }
        }
        "group_dm" => info.name.clone(),
        _ => {
            if info.name.starts_with('#') {
                info.name.clone()
            } else {
                format!("#{}", info.name)
            }
        }
    }
}

/// Pure selection over a client.counts response: mute/mention/type
/// filters, display-name resolution, stable priority sort, budget cap.
pub(crate) fn select_from_counts(
    counts: &wire::ClientCountsResponse,
    params: &UnreadsParams,
    muted: &HashMap<String, bool>,
    users: &UsersCache,
    channels: &ChannelsCache,
) -> Vec<UnreadChannelRow> {
    let mut rows: Vec<UnreadChannelRow> = Vec::new();

    let drop_entry = |entry: &wire::CountsEntry| {
        !entry.has_unreads
            || muted.get(&entry.id).copied().unwrap_or(false)
            || (params.mentions_only && entry.mention_count == 0)
    };

    for entry in &counts.channels {
        if drop_entry(entry) {
            continue;
        }
        let mut channel_name = entry.id.clone();
        let mut channel_type = "internal";
        if let Some(cached) = channels.channels.get(&entry.id) {
            channel_name = if cached.name.starts_with('#') {
                cached.name.clone()
            } else {
                format!("#{}", cached.name)
            };
            if cached.is_ext_shared {
                channel_type = "partner";
            }
        }
        if params.channel_types != "all" && params.channel_types != channel_type {
            continue;
        }
        rows.push(UnreadChannelRow {
            channel_id: entry.id.clone(),
            channel_name,
            channel_type: channel_type.to_string(),
            unread_count: entry.mention_count,
            last_read: entry.last_read.clone(),
            latest: entry.latest.clone(),
        });
    }

    for entry in &counts.mpims {
        if drop_entry(entry) {
            continue;
        }
        if params.channel_types != "all" && params.channel_types != "group_dm" {
            continue;
        }
        let channel_name = channels
            .channels
            .get(&entry.id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| entry.id.clone());
        rows.push(UnreadChannelRow {
            channel_id: entry.id.clone(),
            channel_name,
            channel_type: "group_dm".to_string(),
            unread_count: entry.mention_count,
            last_read: entry.last_read.clone(),
            latest: entry.latest.clone(),
        });
    }

    for entry in &counts.ims {
        if drop_entry(entry) {
            continue;
        }
        if params.channel_types != "all" && params.channel_types != "dm" {
            continue;
        }
        let mut channel_name = entry.id.clone();
        if let Some(cached) = channels.channels.get(&entry.id) {
            if !cached.user.is_empty() {
                channel_name = match users.users.get(&cached.user) {
                    Some(u) => format!("@{}", u.name),
                    None => format!("@{}", cached.user),
                };
            }
        }
        rows.push(UnreadChannelRow {
            channel_id: entry.id.clone(),
            channel_name,
            channel_type: "dm".to_string(),
            unread_count: entry.mention_count,
            last_read: entry.last_read.clone(),
            latest: entry.latest.clone(),
        });
    }

    rows.sort_by_key(|row| channel_priority(&row.channel_type));
    rows.truncate(params.max_channels);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> UnreadsParams {
        UnreadsParams {
            include_messages: false,
            channel_types: "all".to_string(),
            max_channels: 50,
            max_messages_per_channel: 10,
            mentions_only: false,
            include_muted: false,
        }
    }

    fn entry(id: &str, mentions: i64) -> wire::CountsEntry {
        wire::CountsEntry {
            id: id.to_string(),
            has_unreads: true,
            mention_count: mentions,
            last_read: "1736500000.000000".to_string(),
            latest: "1736510400.000000".to_string(),
        }
    }

    fn counts_fixture() -> wire::ClientCountsResponse {
        wire::ClientCountsResponse {
            channels: vec![entry("C1", 0)],
            mpims: vec![entry("G1", 1)],
            ims: vec![entry("D1", 2)],
        }
    }

    fn caches() -> (UsersCache, ChannelsCache) {
        let users_wire = vec![wire::User {
            id: "U1".into(),
            name: "alice".into(),
            ..Default::default()
        }];
        let users = UsersCache::from_users(&users_wire);
        let chans = vec![
            wire::Channel {
                id: "C1".into(),
                name: "general".into(),
                ..Default::default()
            },
            wire::Channel {
                id: "G1".into(),
                name: "mpdm-alice--bob-1".into(),
                is_mpim: true,
                ..Default::default()
            },
            wire::Channel {
                id: "D1".into(),
                name: String::new(),
                is_im: true,
                user: "U1".into(),
                ..Default::default()
            },
        ];
        let channels = ChannelsCache::from_channels(&chans, &users);
        (users, channels)
    }

    #[test]
    fn priority_order_dm_first() {
        let (users, channels) = caches();
        let rows = select_from_counts(&counts_fixture(), &params(), &HashMap::new(), &users, &channels);
        let types: Vec<&str> = rows.iter().map(|r| r.channel_type.as_str()).collect();
        assert_eq!(types, vec!["dm", "group_dm", "internal"]);
        for pair in rows.windows(2) {
            assert!(channel_priority(&pair[0].channel_type) <= channel_priority(&pair[1].channel_type));
        }
    }

    #[test]
    fn mentions_only_keeps_mentioned_channels() {
        let (users, channels) = caches();
        let mut p = params();
        p.mentions_only = true;
        let counts = wire::ClientCountsResponse {
            channels: vec![entry("C1", 0)],
            mpims: vec![],
            ims: vec![entry("D1", 2)],
        };
        let rows = select_from_counts(&counts, &p, &HashMap::new(), &users, &channels);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel_id, "D1");
        assert_eq!(rows[0].channel_name, "@alice");
    }

    #[test]
    fn muted_channels_are_dropped() {
        let (users, channels) = caches();
        let muted: HashMap<String, bool> = [("C1".to_string(), true)].into_iter().collect();
        let rows = select_from_counts(&counts_fixture(), &params(), &muted, &users, &channels);
        assert!(rows.iter().all(|r| r.channel_id != "C1"));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn channel_types_filter() {
        let (users, channels) = caches();
        let mut p = params();
        p.channel_types = "dm".to_string();
        let rows = select_from_counts(&counts_fixture(), &p, &HashMap::new(), &users, &channels);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel_type, "dm");
    }

    #[test]
    fn partner_classification_from_cache() {
        let users = UsersCache::default();
        let chans = vec![wire::Channel {
            id: "C9".into(),
            name: "shared-ext".into(),
            is_ext_shared: true,
            ..Default::default()
        }];
        let channels = ChannelsCache::from_channels(&chans, &users);
        let counts = wire::ClientCountsResponse {
            channels: vec![entry("C9", 1)],
            ..Default::default()
        };
        let rows = select_from_counts(&counts, &params(), &HashMap::new(), &users, &channels);
        assert_eq!(rows[0].channel_type, "partner");
    }

    #[test]
    fn read_channels_are_skipped() {
        let (users, channels) = caches();
        let mut counts = counts_fixture();
        counts.channels[0].has_unreads = false;
        let rows = select_from_counts(&counts, &params(), &HashMap::new(), &users, &channels);
        assert!(rows.iter().all(|r| r.channel_id != "C1"));
    }

    #[test]
    fn max_channels_caps_output() {
        let (users, channels) = caches();
        let mut p = params();
        p.max_channels = 2;
        let rows = select_from_counts(&counts_fixture(), &p, &HashMap::new(), &users, &channels);
        assert_eq!(rows.len(), 2);
        // DMs survive the cap first.
        assert_eq!(rows[0].channel_type, "dm");
    }

    #[test]
    fn unresolved_dm_counterparty_uses_raw_id() {
        let users = UsersCache::default();
        let chans = vec![wire::Channel {
            id: "D7".into(),
            is_im: true,
            user: "U404".into(),
            ..Default::default()
        }];
        let channels = ChannelsCache::from_channels(&chans, &users);
        let counts = wire::ClientCountsResponse {
            ims: vec![entry("D7", 1)],
            ..Default::default()
        };
        let rows = select_from_counts(&counts, &params(), &HashMap::new(), &users, &channels);
        assert_eq!(rows[0].channel_name, "@U404");
    }

    #[test]
    fn display_name_for_oauth_path() {
        let users_wire = vec![wire::User {
            id: "U1".into(),
            name: "alice".into(),
            ..Default::default()
        }];
        let users = UsersCache::from_users(&users_wire);

        let mut dm = wire::Channel::default();
        dm.id = "D1".into();
        dm.user = "U1".into();
        assert_eq!(display_name_from_info(&dm, "dm", &users), "@alice");

        let mut ch = wire::Channel::default();
        ch.name = "general".into();
        assert_eq!(display_name_from_info(&ch, "internal", &users), "#general");

        let mut mpim = wire::Channel::default();
        mpim.name = "mpdm-a--b-1".into();
        assert_eq!(display_name_from_info(&mpim, "group_dm", &users), "mpdm-a--b-1");
    }
}
