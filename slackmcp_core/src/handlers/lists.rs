//! Slack Lists items (edge endpoint, browser-session tokens only).

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
pub struct ListItemRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ListID")]
    pub list_id: String,
    #[serde(rename = "CreatedBy")]
    pub created_by: String,
    #[serde(rename = "Created")]
    pub created: String,
    #[serde(rename = "Updated")]
    pub updated: String,
    #[serde(rename = "Archived")]
    pub archived: bool,
    #[serde(rename = "Fields")]
    pub fields: String,
    #[serde(rename = "Cursor")]
    pub cursor: String,
}

pub struct ListsHandler {
    provider: Arc<Provider>,
}

impl ListsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn items_list(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let args = Args(request.arguments.as_ref());
        let list_id = args.str("list_id", "");
        if list_id.is_empty() {
            return Err(ServerError::InvalidParams("list_id is required".into()));
        }
        let limit = args.int("limit", 100).clamp(1, 1000) as u32;
        let cursor = args.str("cursor", "");

        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let response = client.list_items(&list_id, limit, &cursor).await?;
        debug!(list_id = %list_id, count = response.items.len(), "list items fetched");

        let mut rows: Vec<ListItemRow> = response
            .items
            .iter()
            .map(|item| ListItemRow {
                id: item.id.clone(),
                list_id: item.list_id.clone(),
                created_by: item.created_by.clone(),
                created: epoch_or_empty(item.date_created),
                updated: epoch_or_empty(item.updated_timestamp),
                archived: item.archived,
                fields: item
                    .fields
                    .iter()
                    .map(|f| {
                        let value = f
                            .value
                            .as_ref()
                            .map(|v| match v.as_str() {
                                Some(s) => s.to_string(),
                                None => v.to_string(),
                            })
                            .unwrap_or_default();
                        format!("{}={}", if f.key.is_empty() { &f.column_id } else { &f.key }, value)
                    })
                    .collect::<Vec<_>>()
                    .join("|"),
                cursor: String::new(),
            })
            .collect();

        let next_cursor = response.response_metadata.next_cursor;
        if let (Some(last), false) = (rows.last_mut(), next_cursor.is_empty()) {
            last.cursor = next_cursor;
        }
        csv_result(&rows)
    }
}

fn epoch_or_empty(epoch: i64) -> String {
    if epoch <= 0 {
        return String::new();
    }
    text::timestamp_to_rfc3339(&epoch.to_string()).unwrap_or_default()
}
