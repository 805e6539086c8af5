//! User search via the edge `users/search` endpoint (browser-session
//! tokens only). Deleted users are dropped and each hit is joined with
//! its DM channel id from the channels cache.

use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde::Serialize;
use tracing::debug;

use super::{csv_result, text_result, Args};
use crate::auth::AuthContext;
use crate::error::ServerError;
use crate::provider::Provider;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserSearchRow {
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "RealName")]
    pub real_name: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "DMChannelID")]
    pub dm_channel_id: String,
}

pub struct UsersHandler {
    provider: Arc<Provider>,
}

impl UsersHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn users_search(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        self.provider.is_ready()?;
        let args = Args(request.arguments.as_ref());

        let query = args.str("query", "").trim().to_string();
        if query.is_empty() {
            return Err(ServerError::InvalidParams("query is required".into()));
        }
        let limit = args.int("limit", 10).clamp(1, 100) as u32;
        debug!(query = %query, limit, "users_search");

        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let users = client.users_search(&query, limit).await?;

        let channels = self.provider.channels_snapshot().await;
        let mut rows: Vec<UserSearchRow> = Vec::with_capacity(users.len());
        for user in &users {
            if user.deleted {
                continue;
            }
            let dm_channel_id = channels
                .channels
                .values()
                .find(|ch| ch.is_im && ch.user == user.id)
                .map(|ch| ch.id.clone())
                .unwrap_or_default();
            rows.push(UserSearchRow {
                user_id: user.id.clone(),
                user_name: user.name.clone(),
                real_name: user.real_name.clone(),
                display_name: user.profile.display_name.clone(),
                email: user.profile.email.clone(),
                title: user.profile.title.clone(),
                dm_channel_id,
            });
        }

        if rows.is_empty() {
            return Ok(text_result("No users found matching the query.".to_string()));
        }
        csv_result(&rows)
    }
}
