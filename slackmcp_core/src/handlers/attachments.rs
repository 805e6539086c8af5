//! File attachment download. Capped at 5 MiB; text MIME types return
//! inline, everything else is base64-encoded. Output is a compact JSON
//! object rather than CSV.

use std::sync::Arc;

use base64::Engine;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde_json::json;
use tracing::debug;

use super::conversations::ensure_write_tool_enabled;
use super::{text_result, Args};
use crate::auth::AuthContext;
use crate::config;
use crate::error::ServerError;
use crate::provider::Provider;
use crate::tools;

pub const MAX_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;

pub struct AttachmentsHandler {
    provider: Arc<Provider>,
}

impl AttachmentsHandler {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub async fn get_data(
        &self,
        auth: &AuthContext,
        request: &CallToolRequestParam,
    ) -> Result<CallToolResult, ServerError> {
        let policy = config::env(config::ENV_ATTACHMENT_TOOL);
        ensure_write_tool_enabled(
            tools::TOOL_ATTACHMENT_GET_DATA,
            &policy,
            "the attachment_get_data tool is disabled. Set SLACK_MCP_ATTACHMENT_TOOL=true to enable it",
        )?;
        if !policy.is_empty() && !config::is_truthy(&policy) {
            return Err(ServerError::PolicyDenied(
                "SLACK_MCP_ATTACHMENT_TOOL must be set to 'true', '1', or 'yes' to enable".into(),
            ));
        }

        let args = Args(request.arguments.as_ref());
        let file_id = args.str("file_id", "");
        if file_id.is_empty() {
            return Err(ServerError::InvalidParams("file_id is required".into()));
        }

        let client = self.provider.client_for(auth.slack_token.as_deref()).await?;
        let info = client.get_file_info(&file_id).await?;

        if info.size > MAX_FILE_SIZE_BYTES {
            return Err(ServerError::ResourceLimit(format!(
                "file size {} bytes exceeds maximum allowed size of {} bytes",
                info.size, MAX_FILE_SIZE_BYTES
            )));
        }

        let download_url = if !info.url_private_download.is_empty() {
            info.url_private_download.clone()
        } else if !info.url_private.is_empty() {
            info.url_private.clone()
        } else {
            return Err(ServerError::InvalidInput("file has no downloadable URL".into()));
        };

        debug!(file_id = %info.id, size = info.size, mimetype = %info.mimetype, "downloading attachment");
        let content = client.download_file(&download_url).await?;
        if content.len() as u64 > MAX_FILE_SIZE_BYTES {
            return Err(ServerError::ResourceLimit(format!(
                "file size {} bytes exceeds maximum allowed size of {} bytes",
                content.len(),
                MAX_FILE_SIZE_BYTES
            )));
        }

        let (encoding, body) = if is_text_mimetype(&info.mimetype) {
            ("none", String::from_utf8_lossy(&content).into_owned())
        } else {
            (
                "base64",
                base64::engine::general_purpose::STANDARD.encode(&content),
            )
        };

        let payload = json!({
            "file_id": info.id,
            "filename": info.name,
            "mimetype": info.mimetype,
            "size": content.len(),
            "encoding": encoding,
            "content": body,
        });
        Ok(text_result(payload.to_string()))
    }
}

fn is_text_mimetype(mimetype: &str) -> bool {
    if mimetype.starts_with("text/") {
        return true;
    }
    matches!(
        mimetype,
        "application/json"
            | "application/xml"
            | "application/javascript"
            | "application/x-yaml"
            | "application/x-sh"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_mimetypes() {
        assert!(is_text_mimetype("text/plain"));
        assert!(is_text_mimetype("text/csv"));
        assert!(is_text_mimetype("application/json"));
        assert!(is_text_mimetype("application/x-sh"));
        assert!(!is_text_mimetype("image/png"));
        assert!(!is_text_mimetype("application/octet-stream"));
    }
}
