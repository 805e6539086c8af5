//! Undocumented "edge" endpoints used by Slack's own web client.
//!
//! These only work with browser-session credentials; the facade rejects
//! them for OAuth tokens before any network traffic happens. The response
//! shapes are not covered by Slack's compatibility promises, so decoding
//! here is deliberately forgiving.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::types::{ClientCountsResponse, ListItemsResponse, User};
use super::SlackClient;
use crate::error::ServerError;

const EDGE_BASE: &str = "https://edge.slack.com";

impl SlackClient {
    /// `client.counts`: one call returning unread/mention state for every
    /// channel, MPIM and IM the user can see.
    pub async fn client_counts(&self) -> Result<ClientCountsResponse, ServerError> {
        self.require_edge_session("client.counts")?;
        let v = self
            .api_form(
                "client.counts",
                &[
                    ("thread_counts_by_channel", "true".to_string()),
                    ("org_wide_aware", "true".to_string()),
                ],
            )
            .await?;
        serde_json::from_value(v).map_err(|e| ServerError::SlackApi {
            endpoint: "client.counts".to_string(),
            error: format!("unexpected response shape: {}", e),
        })
    }

    /// Fetch the user's muted-channel set from `users.prefs.get`.
    ///
    /// The `all_notifications_prefs` pref is a JSON string *containing*
    /// JSON. Slack has changed this format silently before, so a malformed
    /// inner payload decodes to "no muted channels" instead of erroring.
    pub async fn get_muted_channels(&self) -> Result<HashMap<String, bool>, ServerError> {
        self.require_edge_session("users.prefs.get")?;
        let v = self.api_form("users.prefs.get", &[]).await?;

        let raw = match v
            .pointer("/prefs/all_notifications_prefs")
            .and_then(Value::as_str)
        {
            Some(s) => s.to_string(),
            None => return Ok(HashMap::new()),
        };

        #[derive(serde::Deserialize, Default)]
        struct NotifPrefs {
            #[serde(default)]
            channels: HashMap<String, ChannelNotif>,
        }
        #[derive(serde::Deserialize, Default)]
        struct ChannelNotif {
            #[serde(default)]
            muted: Option<bool>,
        }

        let prefs: NotifPrefs = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "all_notifications_prefs payload did not decode; treating as unmuted");
                return Ok(HashMap::new());
            }
        };

        let mut muted = HashMap::new();
        for (channel_id, settings) in prefs.channels {
            if settings.muted == Some(true) {
                muted.insert(channel_id, true);
            }
        }
        Ok(muted)
    }

    /// `users/search` on the edge cache: matches name, email and display
    /// name. The URL embeds the team id, resolved lazily via auth.test.
    pub async fn users_search(&self, query: &str, count: u32) -> Result<Vec<User>, ServerError> {
        self.require_edge_session("users/search")?;
        let team_id = self.resolve_team_id().await?;
        let url = format!("{}/cache/{}/users/search", EDGE_BASE, team_id);
        let count = if count == 0 { 10 } else { count };

        let body = serde_json::json!({
            "token": self.token_for_edge(),
            "query": query,
            "count": count,
            "fuzz": 1,
        });
        let resp = self
            .edge_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ServerError::HttpRequest)?;
        let v = self.parse_envelope("users/search", resp).await?;

        #[derive(serde::Deserialize, Default)]
        struct Results {
            #[serde(default)]
            results: Vec<User>,
        }
        let results: Results = serde_json::from_value(v).map_err(|e| ServerError::SlackApi {
            endpoint: "users/search".to_string(),
            error: format!("unexpected response shape: {}", e),
        })?;
        Ok(results.results)
    }

    /// `slackLists.items.list` for a Slack List.
    pub async fn list_items(
        &self,
        list_id: &str,
        limit: u32,
        cursor: &str,
    ) -> Result<ListItemsResponse, ServerError> {
        self.require_edge_session("slackLists.items.list")?;
        let mut form = vec![("list_id", list_id.to_string())];
        if limit > 0 {
            form.push(("limit", limit.to_string()));
        }
        if !cursor.is_empty() {
            form.push(("cursor", cursor.to_string()));
        }
        let v = self.api_form("slackLists.items.list", &form).await?;
        serde_json::from_value(v).map_err(|e| ServerError::SlackApi {
            endpoint: "slackLists.items.list".to_string(),
            error: format!("unexpected response shape: {}", e),
        })
    }
}
