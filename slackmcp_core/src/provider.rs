//! The API provider: one Slack client plus the workspace caches and their
//! readiness/refresh state machine.
//!
//! Caches start empty, load from disk when a snapshot exists, and backfill
//! from Slack in the background. Readers always see a complete snapshot
//! (`Arc` swap on refresh success); name-based lookups are gated on the
//! readiness flags so requests can be served while sync is in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::cache::{self, ChannelsCache, UsersCache};
use crate::coalesce::Coalescer;
use crate::error::ServerError;
use crate::limiter::{call_with_retry, slack_retry_after, Tier};
use crate::slack::{Credentials, SlackClient};

/// Channel types synced into the channels cache.
pub const ALL_CHANNEL_TYPES: &str = "public_channel,private_channel,im,mpim";

/// How long a rate-limited refresh failure suppresses further attempts.
const REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// Capacity of the per-request token -> client cache.
const CLIENT_LRU_CAPACITY: usize = 64;

#[derive(Default)]
struct ClientLru {
    clients: HashMap<String, Arc<SlackClient>>,
    order: Vec<String>,
}

impl ClientLru {
    fn get(&mut self, token: &str) -> Option<Arc<SlackClient>> {
        let client = self.clients.get(token).cloned()?;
        if let Some(pos) = self.order.iter().position(|t| t == token) {
            let t = self.order.remove(pos);
            self.order.push(t);
        }
        Some(client)
    }

    fn insert(&mut self, token: String, client: Arc<SlackClient>) {
        if self.clients.len() >= CLIENT_LRU_CAPACITY && !self.clients.contains_key(&token) {
            if let Some(evicted) = self.order.first().cloned() {
                self.order.remove(0);
                self.clients.remove(&evicted);
            }
        }
        self.clients.insert(token.clone(), client);
        self.order.retain(|t| t != &token);
        self.order.push(token);
    }
}

pub struct Provider {
    client: Arc<SlackClient>,
    users: RwLock<Arc<UsersCache>>,
    channels: RwLock<Arc<ChannelsCache>>,
    users_ready: AtomicBool,
    channels_ready: AtomicBool,
    users_refresh: Coalescer,
    channels_refresh: Coalescer,
    per_request: Mutex<ClientLru>,
    transport: String,
}

impl Provider {
    pub fn new(client: SlackClient, transport: &str) -> Arc<Provider> {
        Arc::new(Provider {
            client: Arc::new(client),
            users: RwLock::new(Arc::new(UsersCache::default())),
            channels: RwLock::new(Arc::new(ChannelsCache::default())),
            users_ready: AtomicBool::new(false),
            channels_ready: AtomicBool::new(false),
            users_refresh: Coalescer::new(),
            channels_refresh: Coalescer::new(),
            per_request: Mutex::new(ClientLru::default()),
            transport: transport.to_string(),
        })
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// The process-wide client built from configured credentials.
    pub fn client(&self) -> Arc<SlackClient> {
        self.client.clone()
    }

    /// The client serving this request: the per-request token's client
    /// when one was presented, otherwise the configured one. Per-request
    /// clients are built once per token and reused through an LRU.
    pub async fn client_for(
        &self,
        slack_token: Option<&str>,
    ) -> Result<Arc<SlackClient>, ServerError> {
        let token = match slack_token {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(self.client.clone()),
        };
        let mut lru = self.per_request.lock().await;
        if let Some(client) = lru.get(token) {
            return Ok(client);
        }
        let creds = Credentials::from_bearer(token)?;
        let client = Arc::new(SlackClient::new(creds)?);
        lru.insert(token.to_string(), client.clone());
        Ok(client)
    }

    pub async fn users_snapshot(&self) -> Arc<UsersCache> {
        self.users.read().await.clone()
    }

    pub async fn channels_snapshot(&self) -> Arc<ChannelsCache> {
        self.channels.read().await.clone()
    }

    /// Readiness gate. Users are reported first: IM/MPIM display names in
    /// the channels directory depend on the users directory.
    pub fn is_ready(&self) -> Result<(), ServerError> {
        if !self.users_ready.load(Ordering::Acquire) {
            return Err(ServerError::UsersNotReady);
        }
        if !self.channels_ready.load(Ordering::Acquire) {
            return Err(ServerError::ChannelsNotReady);
        }
        Ok(())
    }

    /// Load snapshots from disk and backfill from Slack. Called once at
    /// startup on a background task; disk snapshots make the server ready
    /// immediately while the API sync replaces them.
    pub async fn boot(self: &Arc<Self>) {
        if let Some(loaded) = UsersCache::load(&cache::users_cache_path()) {
            *self.users.write().await = Arc::new(loaded);
            self.users_ready.store(true, Ordering::Release);
            info!("users cache loaded from disk");
        }
        if let Some(loaded) = ChannelsCache::load(&cache::channels_cache_path()) {
            *self.channels.write().await = Arc::new(loaded);
            self.channels_ready.store(true, Ordering::Release);
            info!("channels cache loaded from disk");
        }

        if let Err(e) = self.force_refresh_users().await {
            error!(error = %e, "initial users sync failed");
        }
        if let Err(e) = self.force_refresh_channels().await {
            error!(error = %e, "initial channels sync failed");
        }
    }

    /// Refresh the users directory from `users.list`. Single-flight: a
    /// caller arriving while a refresh is in flight waits for its result.
    pub async fn force_refresh_users(self: &Arc<Self>) -> Result<(), ServerError> {
        let me = self.clone();
        self.users_refresh
            .run(REFRESH_COOLDOWN, move || async move {
                me.refresh_users_inner().await
            })
            .await
    }

    pub async fn force_refresh_channels(self: &Arc<Self>) -> Result<(), ServerError> {
        let me = self.clone();
        self.channels_refresh
            .run(REFRESH_COOLDOWN, move || async move {
                me.refresh_channels_inner().await
            })
            .await
    }

    async fn refresh_users_inner(&self) -> Result<(), ServerError> {
        let limiter = Tier::Tier2.limiter();
        let mut members = Vec::new();
        let mut cursor = String::new();
        loop {
            let client = self.client.clone();
            let cur = cursor.clone();
            let page = call_with_retry(&limiter, 2, slack_retry_after, move || {
                let client = client.clone();
                let cur = cur.clone();
                async move { client.users_list(&cur).await }
            })
            .await?;
            members.extend(page.members);
            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }

        let cache = UsersCache::from_users(&members);
        let count = cache.users.len();
        if let Err(e) = cache.save(&cache::users_cache_path()) {
            warn!(error = %e, "failed to persist users cache");
        }
        *self.users.write().await = Arc::new(cache);
        self.users_ready.store(true, Ordering::Release);
        info!(count, "users cache refreshed");
        Ok(())
    }

    async fn refresh_channels_inner(&self) -> Result<(), ServerError> {
        let limiter = Tier::Tier2.limiter();
        let mut channels = Vec::new();
        let mut cursor = String::new();
        loop {
            let client = self.client.clone();
            let cur = cursor.clone();
            let page = call_with_retry(&limiter, 2, slack_retry_after, move || {
                let client = client.clone();
                let cur = cur.clone();
                async move { client.conversations_list(ALL_CHANNEL_TYPES, &cur).await }
            })
            .await?;
            channels.extend(page.channels);
            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }

        let users = self.users_snapshot().await;
        let cache = ChannelsCache::from_channels(&channels, &users);
        let count = cache.channels.len();
        if let Err(e) = cache.save(&cache::channels_cache_path()) {
            warn!(error = %e, "failed to persist channels cache");
        }
        *self.channels.write().await = Arc::new(cache);
        self.channels_ready.store(true, Ordering::Release);
        info!(count, "channels cache refreshed");
        Ok(())
    }

    /// Resolve `#name` / `@handle` / group-DM labels to a channel id.
    ///
    /// A miss triggers one single-flight cache refresh and one re-lookup.
    /// A refresh suppressed by the rate-limit cooldown is reported
    /// distinctly from a plain "not found" so clients know retrying later
    /// may succeed.
    pub async fn resolve_channel_id(self: &Arc<Self>, input: &str) -> Result<String, ServerError> {
        if looks_like_channel_id(input) {
            return Ok(input.to_string());
        }

        if let Some(id) = self.channels_snapshot().await.channels_inv.get(input) {
            return Ok(id.clone());
        }

        match self.force_refresh_channels().await {
            Ok(()) => {}
            Err(ServerError::RefreshRateLimited) => {
                warn!(channel = input, "channel not found; cache refresh was rate-limited");
                return Err(ServerError::NotFound(format!(
                    "channel {:?} (cache refresh was rate-limited, try again later)",
                    input
                )));
            }
            Err(e) => {
                error!(channel = input, error = %e, "channels cache refresh failed");
                return Err(e);
            }
        }

        if let Some(id) = self.channels_snapshot().await.channels_inv.get(input) {
            return Ok(id.clone());
        }
        Err(ServerError::NotFound(format!("channel {:?}", input)))
    }
}

/// Channel ids start with C (channels), G (groups), D (IMs) or S (shared)
/// followed by an uppercase alphanumeric tail.
pub fn looks_like_channel_id(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !matches!(first, 'C' | 'G' | 'D' | 'S') {
        return false;
    }
    let mut any = false;
    for c in chars {
        if !(c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return false;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_detection() {
        assert!(looks_like_channel_id("C0123ABCD"));
        assert!(looks_like_channel_id("D99999999"));
        assert!(looks_like_channel_id("G1234"));
        assert!(looks_like_channel_id("S1234"));
        assert!(!looks_like_channel_id("#general"));
        assert!(!looks_like_channel_id("@alice"));
        assert!(!looks_like_channel_id("mpdm-a--b-1"));
        assert!(!looks_like_channel_id("C"));
        assert!(!looks_like_channel_id(""));
    }

    #[test]
    fn lru_evicts_oldest() {
        let mut lru = ClientLru::default();
        for i in 0..CLIENT_LRU_CAPACITY {
            let creds = Credentials {
                token: format!("xoxp-{}", i),
                cookie: None,
                kind: crate::slack::TokenKind::UserOAuth,
            };
            lru.insert(format!("xoxp-{}", i), Arc::new(SlackClient::new(creds).unwrap()));
        }
        // Touch the first entry so it is no longer the eviction candidate.
        assert!(lru.get("xoxp-0").is_some());

        let creds = Credentials {
            token: "xoxp-new".into(),
            cookie: None,
            kind: crate::slack::TokenKind::UserOAuth,
        };
        lru.insert("xoxp-new".into(), Arc::new(SlackClient::new(creds).unwrap()));

        assert!(lru.get("xoxp-0").is_some(), "recently used entry survives");
        assert!(lru.get("xoxp-1").is_none(), "least recently used entry evicted");
    }
}
