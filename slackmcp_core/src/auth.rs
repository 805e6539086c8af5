//! Request authentication for the SSE/HTTP transports.
//!
//! Three bearer shapes arrive on the `Authorization` header: raw Slack
//! tokens (xoxp/xoxb/xoxc/xoxd prefixes), MCP-issued opaque tokens, and
//! the static API key. Slack tokens ride along in the request context and
//! bypass API-key validation; MCP tokens resolve through the in-memory
//! store; anything else is compared against `SLACK_MCP_API_KEY` in
//! constant time. stdio requests are always trusted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config;
use crate::error::ServerError;

/// Cleanup cadence for expired tokens and states.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Maximum lifetime of an issued MCP access token.
fn token_ttl_cap() -> chrono::Duration {
    chrono::Duration::days(90)
}

/// Maximum lifetime of a pending CSRF state.
fn state_ttl() -> chrono::Duration {
    chrono::Duration::minutes(10)
}

/// Authentication facts attached to one request.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Slack token to use for this request instead of the configured one.
    pub slack_token: Option<String>,
    /// Raw bearer retained for API-key validation.
    pub bearer: Option<String>,
    /// True once an MCP-issued token matched the store.
    pub token_authenticated: bool,
}

pub fn is_slack_token(token: &str) -> bool {
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    token.starts_with("xoxp-")
        || token.starts_with("xoxc-")
        || token.starts_with("xoxb-")
        || token.starts_with("xoxd-")
}

/// Build the per-request auth context from an Authorization header.
pub async fn context_from_header(
    header: Option<&str>,
    store: &McpTokenStore,
) -> AuthContext {
    let mut ctx = AuthContext::default();
    let raw = match header {
        Some(h) if !h.is_empty() => h,
        _ => return ctx,
    };
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim().to_string();

    if is_slack_token(&token) {
        debug!(prefix = &token[..token.len().min(5)], "per-request Slack token detected");
        ctx.slack_token = Some(token);
        return ctx;
    }

    if let Some(info) = store.get_token(&token).await {
        debug!(user_id = %info.user_id, team_id = %info.team_id, "MCP access token matched");
        if !info.slack_token.is_empty() {
            ctx.slack_token = Some(info.slack_token);
        }
        ctx.token_authenticated = true;
        ctx.bearer = Some(token);
        return ctx;
    }

    ctx.bearer = Some(token);
    ctx
}

/// Validate a request for the given transport. stdio is implicitly
/// trusted; http/sse fall through Slack-token bypass, MCP-token match and
/// finally the static API key. No configured key means authentication is
/// disabled (logged, not an error).
pub fn is_authenticated(ctx: &AuthContext, transport: &str) -> Result<(), ServerError> {
    match transport {
        "stdio" => Ok(()),
        "sse" | "http" => {
            if ctx.slack_token.is_some() || ctx.token_authenticated {
                return Ok(());
            }
            let configured = config::env(config::ENV_API_KEY);
            if configured.is_empty() {
                debug!("no API key configured; authentication disabled");
                return Ok(());
            }
            let presented = ctx.bearer.as_deref().unwrap_or("");
            if presented.is_empty() {
                return Err(ServerError::Authentication("missing auth token".into()));
            }
            if !constant_time_eq(configured.as_bytes(), presented.as_bytes()) {
                warn!("invalid auth token presented");
                return Err(ServerError::Authentication("invalid auth token".into()));
            }
            Ok(())
        }
        other => Err(ServerError::Authentication(format!(
            "unknown transport type: {}",
            other
        ))),
    }
}

/// Constant-time byte comparison; a length mismatch is folded into the
/// accumulator rather than short-circuiting.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut acc = a.len() ^ b.len();
    let n = a.len().min(b.len());
    for i in 0..n {
        acc |= usize::from(a[i] ^ b[i]);
    }
    acc == 0
}

/// An MCP-issued access token and the Slack identity behind it.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub mcp_token: String,
    pub slack_token: String,
    pub user_id: String,
    pub team_id: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// In-memory store for MCP tokens and OAuth CSRF states. Restart
/// invalidates everything by design.
#[derive(Default)]
pub struct McpTokenStore {
    tokens: RwLock<HashMap<String, TokenInfo>>,
    states: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl McpTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token, clamping its expiry to the 90-day cap.
    pub async fn put_token(&self, mut info: TokenInfo) {
        let cap = Utc::now() + token_ttl_cap();
        if info.expires_at > cap {
            info.expires_at = cap;
        }
        self.tokens
            .write()
            .await
            .insert(info.mcp_token.clone(), info);
    }

    pub async fn get_token(&self, token: &str) -> Option<TokenInfo> {
        let tokens = self.tokens.read().await;
        let info = tokens.get(token)?;
        if info.expires_at <= Utc::now() {
            return None;
        }
        Some(info.clone())
    }

    pub async fn revoke_token(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }

    pub async fn put_state(&self, state: String) {
        self.states
            .write()
            .await
            .insert(state, Utc::now() + state_ttl());
    }

    /// Validate and consume a CSRF state (single use).
    pub async fn take_state(&self, state: &str) -> bool {
        let mut states = self.states.write().await;
        match states.remove(state) {
            Some(expires) => expires > Utc::now(),
            None => false,
        }
    }

    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.tokens
            .write()
            .await
            .retain(|_, info| info.expires_at > now);
        self.states.write().await.retain(|_, expires| *expires > now);
    }

    /// Periodic cleanup task; runs for the process lifetime.
    pub fn spawn_cleanup(store: Arc<McpTokenStore>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                store.cleanup().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info(token: &str, expires_at: DateTime<Utc>) -> TokenInfo {
        TokenInfo {
            mcp_token: token.to_string(),
            slack_token: "xoxp-stored".to_string(),
            user_id: "U1".to_string(),
            team_id: "T1".to_string(),
            expires_at,
            scopes: vec!["mcp".to_string()],
        }
    }

    #[test]
    fn slack_token_sniffing() {
        assert!(is_slack_token("xoxp-abc"));
        assert!(is_slack_token("Bearer xoxb-abc"));
        assert!(is_slack_token("xoxc-abc"));
        assert!(is_slack_token("xoxd-abc"));
        assert!(!is_slack_token("mcp-opaque"));
        assert!(!is_slack_token(""));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn slack_bearer_bypasses_store() {
        let store = McpTokenStore::new();
        let ctx = context_from_header(Some("Bearer xoxp-123"), &store).await;
        assert_eq!(ctx.slack_token.as_deref(), Some("xoxp-123"));
        assert!(is_authenticated(&ctx, "http").is_ok());
    }

    #[tokio::test]
    async fn mcp_token_resolves_slack_token() {
        let store = McpTokenStore::new();
        store
            .put_token(token_info("opaque-1", Utc::now() + chrono::Duration::hours(1)))
            .await;
        let ctx = context_from_header(Some("Bearer opaque-1"), &store).await;
        assert!(ctx.token_authenticated);
        assert_eq!(ctx.slack_token.as_deref(), Some("xoxp-stored"));
    }

    #[tokio::test]
    async fn expired_token_is_a_miss() {
        let store = McpTokenStore::new();
        store
            .put_token(token_info("opaque-2", Utc::now() - chrono::Duration::hours(1)))
            .await;
        assert!(store.get_token("opaque-2").await.is_none());
    }

    #[tokio::test]
    async fn expiry_clamped_to_cap() {
        let store = McpTokenStore::new();
        store
            .put_token(token_info("opaque-3", Utc::now() + chrono::Duration::days(400)))
            .await;
        let info = store.get_token("opaque-3").await.unwrap();
        assert!(info.expires_at <= Utc::now() + chrono::Duration::days(91));
    }

    #[tokio::test]
    async fn states_are_single_use() {
        let store = McpTokenStore::new();
        store.put_state("csrf-1".to_string()).await;
        assert!(store.take_state("csrf-1").await);
        assert!(!store.take_state("csrf-1").await);
    }

    #[test]
    fn stdio_always_authenticated() {
        assert!(is_authenticated(&AuthContext::default(), "stdio").is_ok());
    }
}
