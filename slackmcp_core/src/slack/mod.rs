//! The authenticated Slack client facade.
//!
//! One `SlackClient` covers all four authentication modes behind a closed
//! `TokenKind`: browser-session (xoxc + xoxd cookie), user OAuth (xoxp),
//! bot OAuth (xoxb), and per-request tokens built from an Authorization
//! header. The undocumented edge endpoints (`client.counts`, `users/search`,
//! `users.prefs.get`, `slackLists.items.*`) are only reachable from the
//! browser-session variant; that boundary is enforced here, not in handlers.

pub mod edge;
pub mod types;

use std::time::Duration;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config;
use crate::error::ServerError;

use types::*;

const DEFAULT_BASE: &str = "https://slack.com";
const GOVSLACK_BASE: &str = "https://slack-gov.com";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// Token classification by prefix. `xoxd` never stands alone; it is the
/// cookie half of a browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EdgeSession,
    UserOAuth,
    BotOAuth,
}

impl TokenKind {
    pub fn detect(token: &str) -> Option<TokenKind> {
        if token.starts_with("xoxc-") {
            Some(TokenKind::EdgeSession)
        } else if token.starts_with("xoxp-") {
            Some(TokenKind::UserOAuth)
        } else if token.starts_with("xoxb-") {
            Some(TokenKind::BotOAuth)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    pub cookie: Option<String>,
    pub kind: TokenKind,
}

impl Credentials {
    /// Resolve credentials from the environment. Browser-session tokens
    /// take precedence; xoxc and xoxd are only valid as a pair.
    pub fn from_env() -> Result<Credentials, ServerError> {
        let xoxc = config::env(config::ENV_XOXC_TOKEN);
        let xoxd = config::env(config::ENV_XOXD_TOKEN);
        if !xoxc.is_empty() || !xoxd.is_empty() {
            if xoxc.is_empty() || xoxd.is_empty() {
                return Err(ServerError::Authentication(format!(
                    "{} and {} must be set together for browser-session mode",
                    config::ENV_XOXC_TOKEN,
                    config::ENV_XOXD_TOKEN
                )));
            }
            return Ok(Credentials {
                token: xoxc,
                cookie: Some(xoxd),
                kind: TokenKind::EdgeSession,
            });
        }

        let xoxp = config::env(config::ENV_XOXP_TOKEN);
        if !xoxp.is_empty() {
            return Ok(Credentials {
                token: xoxp,
                cookie: None,
                kind: TokenKind::UserOAuth,
            });
        }

        let xoxb = config::env(config::ENV_XOXB_TOKEN);
        if !xoxb.is_empty() {
            return Ok(Credentials {
                token: xoxb,
                cookie: None,
                kind: TokenKind::BotOAuth,
            });
        }

        Err(ServerError::Authentication(format!(
            "no Slack credentials configured: set {}+{} (browser session), {} (user OAuth) or {} (bot OAuth)",
            config::ENV_XOXC_TOKEN,
            config::ENV_XOXD_TOKEN,
            config::ENV_XOXP_TOKEN,
            config::ENV_XOXB_TOKEN
        )))
    }

    /// Build credentials from a bearer token presented on a request.
    /// xoxc without its paired cookie cannot sign edge requests.
    pub fn from_bearer(token: &str) -> Result<Credentials, ServerError> {
        match TokenKind::detect(token) {
            Some(TokenKind::EdgeSession) => Err(ServerError::Authentication(
                "xoxc tokens require the paired xoxd cookie and cannot be used per-request".into(),
            )),
            Some(kind) => Ok(Credentials {
                token: token.to_string(),
                cookie: None,
                kind,
            }),
            None => Err(ServerError::Authentication(
                "bearer token is not a recognised Slack token".into(),
            )),
        }
    }
}

pub struct SlackClient {
    http: reqwest::Client,
    creds: Credentials,
    base: String,
    /// Team id resolved lazily via auth.test; the edge cache endpoints
    /// embed it in their URL.
    team_id: OnceCell<String>,
}

impl SlackClient {
    pub fn new(creds: Credentials) -> Result<SlackClient, ServerError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(60));

        let user_agent = config::env(config::ENV_USER_AGENT);
        if !user_agent.is_empty() {
            builder = builder.user_agent(user_agent);
        } else if creds.kind == TokenKind::EdgeSession
            && config::is_truthy(&config::env(config::ENV_CUSTOM_TLS))
        {
            // Enterprise workspaces sometimes reject non-browser clients.
            builder = builder.user_agent(BROWSER_USER_AGENT);
        } else {
            builder = builder.user_agent(concat!("slackmcp/", env!("CARGO_PKG_VERSION")));
        }

        let proxy = config::env(config::ENV_PROXY);
        if !proxy.is_empty() {
            builder = builder
                .proxy(reqwest::Proxy::all(&proxy).map_err(ServerError::HttpRequest)?);
        }

        if config::is_truthy(&config::env(config::ENV_SERVER_CA_INSECURE)) {
            builder = builder.danger_accept_invalid_certs(true);
        }
        for env_name in [config::ENV_SERVER_CA, config::ENV_SERVER_CA_TOOLKIT] {
            let ca_path = config::env(env_name);
            if ca_path.is_empty() {
                continue;
            }
            let pem = std::fs::read(&ca_path)?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(ServerError::HttpRequest)?;
            builder = builder.add_root_certificate(cert);
        }

        let base = if config::is_truthy(&config::env(config::ENV_GOVSLACK)) {
            GOVSLACK_BASE
        } else {
            DEFAULT_BASE
        };

        Ok(SlackClient {
            http: builder.build().map_err(ServerError::HttpRequest)?,
            creds,
            base: base.to_string(),
            team_id: OnceCell::new(),
        })
    }

    pub fn kind(&self) -> TokenKind {
        self.creds.kind
    }

    /// True for xoxp and xoxb tokens (public API surface only).
    pub fn is_oauth(&self) -> bool {
        matches!(self.creds.kind, TokenKind::UserOAuth | TokenKind::BotOAuth)
    }

    pub fn is_bot_token(&self) -> bool {
        self.creds.kind == TokenKind::BotOAuth
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/api/{}", self.base, method)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.bearer_auth(&self.creds.token);
        match &self.creds.cookie {
            Some(d) => req.header(reqwest::header::COOKIE, format!("d={}", d)),
            None => req,
        }
    }

    pub(crate) fn token_for_edge(&self) -> &str {
        &self.creds.token
    }

    pub(crate) fn edge_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.apply_auth(self.http.post(url))
    }

    /// POST a Web API method as form data and return the parsed envelope.
    /// 429s become `ServerError::RateLimited` carrying the Retry-After.
    pub(crate) async fn api_form(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ServerError> {
        let url = self.api_url(method);
        debug!(method, "Slack API call");
        let resp = self
            .apply_auth(self.http.post(&url))
            .form(params)
            .send()
            .await
            .map_err(ServerError::HttpRequest)?;
        self.parse_envelope(method, resp).await
    }

    pub(crate) async fn parse_envelope(
        &self,
        method: &str,
        resp: reqwest::Response,
    ) -> Result<Value, ServerError> {
        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(1));
            return Err(ServerError::RateLimited(retry_after));
        }
        if !status.is_success() {
            return Err(ServerError::SlackApi {
                endpoint: method.to_string(),
                error: format!("HTTP {}", status.as_u16()),
            });
        }
        let v: Value = resp.json().await.map_err(ServerError::HttpRequest)?;
        if v.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(v);
        }
        let error = v
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        if error == "ratelimited" {
            return Err(ServerError::RateLimited(Duration::from_secs(1)));
        }
        Err(ServerError::SlackApi {
            endpoint: method.to_string(),
            error,
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        v: Value,
    ) -> Result<T, ServerError> {
        serde_json::from_value(v).map_err(|e| ServerError::SlackApi {
            endpoint: method.to_string(),
            error: format!("unexpected response shape: {}", e),
        })
    }

    pub async fn auth_test(&self) -> Result<AuthTestResponse, ServerError> {
        let v = self.api_form("auth.test", &[]).await?;
        self.decode("auth.test", v)
    }

    /// The workspace's team id, resolved once and cached.
    pub(crate) async fn resolve_team_id(&self) -> Result<String, ServerError> {
        if let Some(id) = self.team_id.get() {
            return Ok(id.clone());
        }
        let ar = self.auth_test().await?;
        let _ = self.team_id.set(ar.team_id.clone());
        Ok(ar.team_id)
    }

    pub async fn conversation_history(
        &self,
        params: &HistoryParams,
    ) -> Result<HistoryResponse, ServerError> {
        let v = self
            .api_form("conversations.history", &params.to_form())
            .await?;
        self.decode("conversations.history", v)
    }

    pub async fn conversation_replies(
        &self,
        thread_ts: &str,
        params: &HistoryParams,
    ) -> Result<HistoryResponse, ServerError> {
        let mut form = params.to_form();
        form.push(("ts", thread_ts.to_string()));
        let v = self.api_form("conversations.replies", &form).await?;
        self.decode("conversations.replies", v)
    }

    pub async fn search_messages(
        &self,
        query: &str,
        count: u32,
        page: u32,
    ) -> Result<SearchResponse, ServerError> {
        if self.is_bot_token() {
            return Err(ServerError::UnsupportedByToken(
                "search.messages requires a user token (xoxp) or browser session tokens (xoxc/xoxd)"
                    .into(),
            ));
        }
        let v = self
            .api_form(
                "search.messages",
                &[
                    ("query", query.to_string()),
                    ("count", count.to_string()),
                    ("page", page.to_string()),
                    ("sort", "score".to_string()),
                    ("sort_dir", "desc".to_string()),
                    ("highlight", "false".to_string()),
                ],
            )
            .await?;
        self.decode("search.messages", v)
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        opts: &PostMessageOptions,
    ) -> Result<PostMessageResponse, ServerError> {
        let mut form = vec![
            ("channel", channel.to_string()),
            ("text", text.to_string()),
            ("mrkdwn", opts.mrkdwn.to_string()),
            ("unfurl_links", opts.unfurl_links.to_string()),
            ("unfurl_media", opts.unfurl_media.to_string()),
        ];
        if let Some(ts) = &opts.thread_ts {
            form.push(("thread_ts", ts.clone()));
        }
        let v = self.api_form("chat.postMessage", &form).await?;
        self.decode("chat.postMessage", v)
    }

    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        mrkdwn: bool,
    ) -> Result<PostMessageResponse, ServerError> {
        let v = self
            .api_form(
                "chat.update",
                &[
                    ("channel", channel.to_string()),
                    ("ts", ts.to_string()),
                    ("text", text.to_string()),
                    ("mrkdwn", mrkdwn.to_string()),
                ],
            )
            .await?;
        self.decode("chat.update", v)
    }

    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ServerError> {
        self.api_form(
            "chat.delete",
            &[("channel", channel.to_string()), ("ts", ts.to_string())],
        )
        .await?;
        Ok(())
    }

    pub async fn mark_conversation(&self, channel: &str, ts: &str) -> Result<(), ServerError> {
        self.api_form(
            "conversations.mark",
            &[("channel", channel.to_string()), ("ts", ts.to_string())],
        )
        .await?;
        Ok(())
    }

    pub async fn add_reaction(
        &self,
        emoji: &str,
        channel: &str,
        ts: &str,
    ) -> Result<(), ServerError> {
        self.api_form(
            "reactions.add",
            &[
                ("name", emoji.to_string()),
                ("channel", channel.to_string()),
                ("timestamp", ts.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn remove_reaction(
        &self,
        emoji: &str,
        channel: &str,
        ts: &str,
    ) -> Result<(), ServerError> {
        self.api_form(
            "reactions.remove",
            &[
                ("name", emoji.to_string()),
                ("channel", channel.to_string()),
                ("timestamp", ts.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_reactions(
        &self,
        channel: &str,
        ts: &str,
    ) -> Result<ReactionsGetResponse, ServerError> {
        let v = self
            .api_form(
                "reactions.get",
                &[
                    ("channel", channel.to_string()),
                    ("timestamp", ts.to_string()),
                    ("full", "true".to_string()),
                ],
            )
            .await?;
        self.decode("reactions.get", v)
    }

    pub async fn get_file_info(&self, file_id: &str) -> Result<File, ServerError> {
        let v = self
            .api_form("files.info", &[("file", file_id.to_string())])
            .await?;
        let resp: FileInfoResponse = self.decode("files.info", v)?;
        Ok(resp.file)
    }

    /// Download a private file URL. The caller enforces any size policy;
    /// this only streams bytes with the session's auth attached.
    pub async fn download_file(&self, url: &str) -> Result<Vec<u8>, ServerError> {
        let resp = self
            .apply_auth(self.http.get(url))
            .send()
            .await
            .map_err(ServerError::HttpRequest)?;
        if !resp.status().is_success() {
            return Err(ServerError::SlackApi {
                endpoint: "files.download".to_string(),
                error: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        let bytes = resp.bytes().await.map_err(ServerError::HttpRequest)?;
        Ok(bytes.to_vec())
    }

    pub async fn users_in_conversation(
        &self,
        channel: &str,
        cursor: &str,
    ) -> Result<MembersResponse, ServerError> {
        let mut form = vec![
            ("channel", channel.to_string()),
            ("limit", "200".to_string()),
        ];
        if !cursor.is_empty() {
            form.push(("cursor", cursor.to_string()));
        }
        let v = self.api_form("conversations.members", &form).await?;
        self.decode("conversations.members", v)
    }

    /// `users.conversations`: only channels the calling user is a member
    /// of. The unread fallback relies on this being much smaller than
    /// `conversations.list` on big workspaces.
    pub async fn conversations_for_user(
        &self,
        types: &str,
        cursor: &str,
    ) -> Result<ConversationsListResponse, ServerError> {
        let mut form = vec![
            ("types", types.to_string()),
            ("limit", "200".to_string()),
            ("exclude_archived", "true".to_string()),
        ];
        if !cursor.is_empty() {
            form.push(("cursor", cursor.to_string()));
        }
        let v = self.api_form("users.conversations", &form).await?;
        self.decode("users.conversations", v)
    }

    pub async fn conversation_info(&self, channel: &str) -> Result<Channel, ServerError> {
        let v = self
            .api_form("conversations.info", &[("channel", channel.to_string())])
            .await?;
        #[derive(serde::Deserialize)]
        struct InfoResponse {
            channel: Channel,
        }
        let resp: InfoResponse = self.decode("conversations.info", v)?;
        Ok(resp.channel)
    }

    pub async fn conversations_list(
        &self,
        types: &str,
        cursor: &str,
    ) -> Result<ConversationsListResponse, ServerError> {
        let mut form = vec![
            ("types", types.to_string()),
            ("limit", "999".to_string()),
            ("exclude_archived", "true".to_string()),
        ];
        if !cursor.is_empty() {
            form.push(("cursor", cursor.to_string()));
        }
        let v = self.api_form("conversations.list", &form).await?;
        self.decode("conversations.list", v)
    }

    pub async fn users_list(&self, cursor: &str) -> Result<UsersListResponse, ServerError> {
        let mut form = vec![("limit", "999".to_string())];
        if !cursor.is_empty() {
            form.push(("cursor", cursor.to_string()));
        }
        let v = self.api_form("users.list", &form).await?;
        self.decode("users.list", v)
    }

    pub async fn usergroups_list(
        &self,
        include_users: bool,
        include_count: bool,
        include_disabled: bool,
    ) -> Result<Vec<UserGroup>, ServerError> {
        let v = self
            .api_form(
                "usergroups.list",
                &[
                    ("include_users", include_users.to_string()),
                    ("include_count", include_count.to_string()),
                    ("include_disabled", include_disabled.to_string()),
                ],
            )
            .await?;
        let resp: UserGroupsResponse = self.decode("usergroups.list", v)?;
        Ok(resp.usergroups)
    }

    pub(crate) fn require_edge_session(&self, endpoint: &str) -> Result<(), ServerError> {
        if self.creds.kind != TokenKind::EdgeSession {
            warn!(endpoint, "edge endpoint requested with a non-browser token");
            return Err(ServerError::UnsupportedByToken(format!(
                "{} is only available with browser session tokens (xoxc/xoxd)",
                endpoint
            )));
        }
        Ok(())
    }
}

/// Common parameter block for history/replies calls.
#[derive(Debug, Clone, Default)]
pub struct HistoryParams {
    pub channel: String,
    pub limit: u32,
    pub oldest: String,
    pub latest: String,
    pub cursor: String,
    pub inclusive: bool,
}

impl HistoryParams {
    fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("channel", self.channel.clone())];
        if self.limit > 0 {
            form.push(("limit", self.limit.to_string()));
        }
        if !self.oldest.is_empty() {
            form.push(("oldest", self.oldest.clone()));
        }
        if !self.latest.is_empty() {
            form.push(("latest", self.latest.clone()));
        }
        if !self.cursor.is_empty() {
            form.push(("cursor", self.cursor.clone()));
        }
        if self.inclusive {
            form.push(("inclusive", "true".to_string()));
        }
        form
    }
}

#[derive(Debug, Clone)]
pub struct PostMessageOptions {
    pub thread_ts: Option<String>,
    pub mrkdwn: bool,
    pub unfurl_links: bool,
    pub unfurl_media: bool,
}

impl Default for PostMessageOptions {
    fn default() -> Self {
        Self {
            thread_ts: None,
            mrkdwn: true,
            unfurl_links: false,
            unfurl_media: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_detection() {
        assert_eq!(TokenKind::detect("xoxc-123"), Some(TokenKind::EdgeSession));
        assert_eq!(TokenKind::detect("xoxp-123"), Some(TokenKind::UserOAuth));
        assert_eq!(TokenKind::detect("xoxb-123"), Some(TokenKind::BotOAuth));
        assert_eq!(TokenKind::detect("xoxd-123"), None);
        assert_eq!(TokenKind::detect("mcp-opaque-token"), None);
    }

    #[test]
    fn per_request_xoxc_rejected() {
        let err = Credentials::from_bearer("xoxc-abc").unwrap_err();
        assert!(matches!(err, ServerError::Authentication(_)));
    }

    #[test]
    fn per_request_oauth_accepted() {
        let creds = Credentials::from_bearer("xoxp-abc").unwrap();
        assert_eq!(creds.kind, TokenKind::UserOAuth);
        assert!(creds.cookie.is_none());
    }

    #[test]
    fn history_params_form() {
        let p = HistoryParams {
            channel: "C1".into(),
            limit: 50,
            oldest: "1.000000".into(),
            latest: String::new(),
            cursor: String::new(),
            inclusive: true,
        };
        let form = p.to_form();
        assert!(form.contains(&("channel", "C1".to_string())));
        assert!(form.contains(&("inclusive", "true".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "latest"));
    }
}
