//! Environment variable names and accessors.
//!
//! Env vars are read per request (not snapshotted at boot) so operators can
//! flip tool policies on a running server. All names live here so the rest
//! of the crate never hardcodes a string.

pub const ENV_XOXC_TOKEN: &str = "SLACK_MCP_XOXC_TOKEN";
pub const ENV_XOXD_TOKEN: &str = "SLACK_MCP_XOXD_TOKEN";
pub const ENV_XOXP_TOKEN: &str = "SLACK_MCP_XOXP_TOKEN";
pub const ENV_XOXB_TOKEN: &str = "SLACK_MCP_XOXB_TOKEN";

pub const ENV_HOST: &str = "SLACK_MCP_HOST";
pub const ENV_PORT: &str = "SLACK_MCP_PORT";
pub const ENV_API_KEY: &str = "SLACK_MCP_API_KEY";
pub const ENV_PROXY: &str = "SLACK_MCP_PROXY";
pub const ENV_USER_AGENT: &str = "SLACK_MCP_USER_AGENT";
pub const ENV_CUSTOM_TLS: &str = "SLACK_MCP_CUSTOM_TLS";
pub const ENV_SERVER_CA: &str = "SLACK_MCP_SERVER_CA";
pub const ENV_SERVER_CA_TOOLKIT: &str = "SLACK_MCP_SERVER_CA_TOOLKIT";
pub const ENV_SERVER_CA_INSECURE: &str = "SLACK_MCP_SERVER_CA_INSECURE";
pub const ENV_GOVSLACK: &str = "SLACK_MCP_GOVSLACK";

pub const ENV_ADD_MESSAGE_TOOL: &str = "SLACK_MCP_ADD_MESSAGE_TOOL";
pub const ENV_ADD_MESSAGE_MARK: &str = "SLACK_MCP_ADD_MESSAGE_MARK";
pub const ENV_ADD_MESSAGE_UNFURLING: &str = "SLACK_MCP_ADD_MESSAGE_UNFURLING";
pub const ENV_REACTION_TOOL: &str = "SLACK_MCP_REACTION_TOOL";
pub const ENV_REACTIONS_TOOL: &str = "SLACK_MCP_REACTIONS_TOOL";
pub const ENV_ATTACHMENT_TOOL: &str = "SLACK_MCP_ATTACHMENT_TOOL";
pub const ENV_EDIT_MESSAGE_TOOL: &str = "SLACK_MCP_EDIT_MESSAGE_TOOL";
pub const ENV_DELETE_MESSAGE_TOOL: &str = "SLACK_MCP_DELETE_MESSAGE_TOOL";
pub const ENV_MARK_TOOL: &str = "SLACK_MCP_MARK_TOOL";

pub const ENV_USERS_CACHE: &str = "SLACK_MCP_USERS_CACHE";
pub const ENV_CHANNELS_CACHE: &str = "SLACK_MCP_CHANNELS_CACHE";
pub const ENV_ENABLED_TOOLS: &str = "SLACK_MCP_ENABLED_TOOLS";
pub const ENV_LOG_LEVEL: &str = "SLACK_MCP_LOG_LEVEL";

/// Read an env var, treating "unset" and "empty" identically.
pub fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// `true`, `1` and `yes` enable a boolean-style toggle.
pub fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes")
}

/// Reaction tool config, honouring both historical spellings of the
/// variable. The singular form wins when both are set.
pub fn reaction_tool_config() -> String {
    let singular = env(ENV_REACTION_TOOL);
    if !singular.is_empty() {
        return singular;
    }
    env(ENV_REACTIONS_TOOL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("TRUE"));
    }
}
