//! Registration-policy tests that exercise the real env-var plumbing.
//! Env vars are process-global, so every test here serialises on a mutex
//! and restores the previous value on drop.

use std::sync::Mutex;

use slackmcp_core::{config, tools};

static ENV_LOCK: Mutex<()> = Mutex::new(());

struct EnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> EnvGuard {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value);
        EnvGuard { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn write_tools_hidden_without_env_vars() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _enabled = EnvGuard::set(config::ENV_ENABLED_TOOLS, "");
    let _add = EnvGuard::set(config::ENV_ADD_MESSAGE_TOOL, "");
    let _react = EnvGuard::set(config::ENV_REACTION_TOOL, "");
    let _reacts = EnvGuard::set(config::ENV_REACTIONS_TOOL, "");
    let _attach = EnvGuard::set(config::ENV_ATTACHMENT_TOOL, "");
    let _edit = EnvGuard::set(config::ENV_EDIT_MESSAGE_TOOL, "");
    let _delete = EnvGuard::set(config::ENV_DELETE_MESSAGE_TOOL, "");
    let _mark = EnvGuard::set(config::ENV_MARK_TOOL, "");

    let registered = tools::registered_tools(&[]);

    assert!(registered.contains(&tools::TOOL_CONVERSATIONS_HISTORY));
    assert!(registered.contains(&tools::TOOL_CHANNELS_LIST));
    assert!(registered.contains(&tools::TOOL_CONVERSATIONS_UNREADS));
    assert!(!registered.contains(&tools::TOOL_CONVERSATIONS_ADD_MESSAGE));
    assert!(!registered.contains(&tools::TOOL_REACTIONS_ADD));
    assert!(!registered.contains(&tools::TOOL_REACTIONS_REMOVE));
    assert!(!registered.contains(&tools::TOOL_ATTACHMENT_GET_DATA));
    assert!(!registered.contains(&tools::TOOL_CONVERSATIONS_EDIT_MESSAGE));
    assert!(!registered.contains(&tools::TOOL_CONVERSATIONS_DELETE_MESSAGE));
    assert!(!registered.contains(&tools::TOOL_CONVERSATIONS_MARK));
}

#[test]
fn env_var_enables_write_tool() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _enabled = EnvGuard::set(config::ENV_ENABLED_TOOLS, "");
    let _add = EnvGuard::set(config::ENV_ADD_MESSAGE_TOOL, "C123,C456");

    let registered = tools::registered_tools(&[]);
    assert!(registered.contains(&tools::TOOL_CONVERSATIONS_ADD_MESSAGE));
}

#[test]
fn explicit_enabled_list_overrides_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _add = EnvGuard::set(config::ENV_ADD_MESSAGE_TOOL, "true");

    let enabled = vec![tools::TOOL_CONVERSATIONS_HISTORY.to_string()];
    let registered = tools::registered_tools(&enabled);

    assert_eq!(registered, vec![tools::TOOL_CONVERSATIONS_HISTORY]);
}

#[test]
fn enabled_list_admits_write_tool_without_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _add = EnvGuard::set(config::ENV_ADD_MESSAGE_TOOL, "");

    let enabled = vec![tools::TOOL_CONVERSATIONS_ADD_MESSAGE.to_string()];
    let registered = tools::registered_tools(&enabled);
    assert_eq!(registered, vec![tools::TOOL_CONVERSATIONS_ADD_MESSAGE]);
}

#[test]
fn reactions_env_var_synonyms() {
    let _lock = ENV_LOCK.lock().unwrap();

    {
        let _singular = EnvGuard::set(config::ENV_REACTION_TOOL, "");
        let _plural = EnvGuard::set(config::ENV_REACTIONS_TOOL, "true");
        assert_eq!(config::reaction_tool_config(), "true");
    }
    {
        let _singular = EnvGuard::set(config::ENV_REACTION_TOOL, "C1");
        let _plural = EnvGuard::set(config::ENV_REACTIONS_TOOL, "C2");
        assert_eq!(config::reaction_tool_config(), "C1", "singular form wins");
    }
}

#[test]
fn enabled_tools_parsing() {
    let _lock = ENV_LOCK.lock().unwrap();
    let _enabled = EnvGuard::set(
        config::ENV_ENABLED_TOOLS,
        "conversations_history, channels_list ,,",
    );
    let parsed = tools::enabled_tools_from_env();
    assert_eq!(parsed, vec!["conversations_history", "channels_list"]);
    assert!(tools::validate_enabled_tools(&parsed).is_ok());
}
