//! User group listing.

use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde::Serialize;
use tracing::debug;

use super::{csv_result, Args};
use crate::auth::AuthContext;
use crate::error::ServerError;
use crate::provider::Provider;
use crate::text;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserGroupRow {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "handle")]
    pub handle: String,
    #[serde(rename = "description")]
    pub description: String,
    #[serde(rename = "user_count")]
    pub user_count: i64,
    #[serde(rename = "is_external")]
    pub is_external: bool,
    #[serde(rename = "date_create")]
    pub date_create: String,
    #[serde(rename = "date_update")]
    pub date_update: String,
    #[serde(rename = "users")]
    pub users: String,
}

pub struct UsergroupsHandler {
    provider: Arc<Provider>,
}

impl UsergroupsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn list(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        self.provider.is_ready()?;
        let args = Args(request.arguments.as_ref());

        let include_users = args.bool("include_users", false);
        let include_count = args.bool("include_count", true);
        let include_disabled = args.bool("include_disabled", false);

        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let groups = client
            .usergroups_list(include_users, include_count, include_disabled)
            .await?;
        debug!(count = groups.len(), "user groups fetched");

        let rows: Vec<UserGroupRow> = groups
            .iter()
            .map(|g| UserGroupRow {
                id: g.id.clone(),
                name: g.name.clone(),
                handle: g.handle.clone(),
                description: g.description.clone(),
                user_count: g.user_count,
                is_external: g.is_external,
                date_create: epoch_to_rfc3339(g.date_create),
                date_update: epoch_to_rfc3339(g.date_update),
                users: g.users.join(","),
            })
            .collect();
        csv_result(&rows)
    }
}

fn epoch_to_rfc3339(epoch: i64) -> String {
    if epoch <= 0 {
        return String::new();
    }
    text::timestamp_to_rfc3339(&epoch.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_conversion() {
        assert_eq!(epoch_to_rfc3339(1736510400), "2025-01-10T12:00:00Z");
        assert_eq!(epoch_to_rfc3339(0), "");
    }
}
