//! MCP resources: the workspace's users and channels directories as CSV.
//! URIs embed the workspace subdomain from `auth.test`, e.g.
//! `slack://myteam/users`.

use std::sync::Arc;

use rmcp::model::{
    ListResourcesResult, RawResource, ReadResourceRequestParam, Resource, ResourceContents,
};
use serde::Serialize;
use tracing::debug;

use crate::auth::AuthContext;
use crate::csvout;
use crate::error::ServerError;
use crate::handlers::channels::ChannelRow;
use crate::provider::Provider;
use crate::text;

#[derive(Debug, Clone, Default, Serialize)]
struct UserRow {
    #[serde(rename = "UserID")]
    user_id: String,
    #[serde(rename = "UserName")]
    user_name: String,
    #[serde(rename = "RealName")]
    real_name: String,
}

pub struct ResourcesHandler {
    provider: Arc<Provider>,
}

impl ResourcesHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn list_resources(
        &self,
        auth: &AuthContext,
    ) -> Result<ListResourcesResult, ServerError> {
        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let ar = client.auth_test().await?;
        let ws = text::workspace(&ar.url)?;

        let resources = vec![
            Resource {
                raw: RawResource {
                    uri: format!("slack://{}/users", ws),
                    name: "Workspace users".to_string(),
                    title: None,
                    description: Some("CSV directory of all users in the workspace".to_string()),
                    mime_type: Some("text/csv".to_string()),
                    size: None,
                    icons: None,
                },
                annotations: None,
            },
            Resource {
                raw: RawResource {
                    uri: format!("slack://{}/channels", ws),
                    name: "Workspace channels".to_string(),
                    title: None,
                    description: Some(
                        "CSV directory of all channels, DMs and group DMs in the workspace"
                            .to_string(),
                    ),
                    mime_type: Some("text/csv".to_string()),
                    size: None,
                    icons: None,
                },
                annotations: None,
            },
        ];

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    pub async fn read_resource(
        &self,
        auth: &AuthContext,
        request: &ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ServerError> {
        let uri = request.uri.as_str();
        debug!(uri, "read_resource");
        if !uri.starts_with("slack://") {
            return Err(ServerError::ResourceNotFound);
        }
        self.provider.is_ready()?;

        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let ar = client.auth_test().await?;
        let ws = text::workspace(&ar.url)?;

        if uri == format!("slack://{}/users", ws) {
            let users = self.provider.users_snapshot().await;
            let mut rows: Vec<UserRow> = users
                .users
                .values()
                .map(|u| UserRow {
                    user_id: u.id.clone(),
                    user_name: u.name.clone(),
                    real_name: u.real_name.clone(),
                })
                .collect();
            rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            let csv = csvout::to_csv(&rows)?;
            return Ok(vec![ResourceContents::text(csv, uri)]);
        }

        if uri == format!("slack://{}/channels", ws) {
            let channels = self.provider.channels_snapshot().await;
            let mut rows: Vec<ChannelRow> = channels
                .channels
                .values()
                .map(|ch| ChannelRow {
                    id: ch.id.clone(),
                    name: ch.name.clone(),
                    topic: ch.topic.clone(),
                    purpose: ch.purpose.clone(),
                    member_count: ch.member_count,
                    cursor: String::new(),
                })
                .collect();
            rows.sort_by(|a, b| a.id.cmp(&b.id));
            let csv = csvout::to_csv(&rows)?;
            return Ok(vec![ResourceContents::text(csv, uri)]);
        }

        Err(ServerError::ResourceNotFound)
    }
}
