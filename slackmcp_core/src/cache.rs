//! On-disk backed directories of workspace users and channels.
//!
//! Both stores are plain JSON maps (`id -> entity`) plus an in-memory
//! inverse index for `#name` / `@handle` lookups. The channels file name
//! embeds a schema version (`channels_cache_v2.json`) so an older process
//! never reads an incompatible newer snapshot; a missing or undecodable
//! file is simply a cache miss. Writes go through a temp file + rename so
//! a crash mid-write cannot leave a half-written snapshot behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config;
use crate::error::ServerError;
use crate::slack::types as wire;

pub const USERS_CACHE_FILE: &str = "users_cache.json";
pub const CHANNELS_CACHE_FILE: &str = "channels_cache_v2.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedUser {
    pub id: String,
    pub name: String,
    pub real_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl From<&wire::User> for CachedUser {
    fn from(u: &wire::User) -> Self {
        CachedUser {
            id: u.id.clone(),
            name: u.name.clone(),
            real_name: u.real_name.clone(),
            display_name: u.profile.display_name.clone(),
            email: u.profile.email.clone(),
            title: u.profile.title.clone(),
            is_bot: u.is_bot,
            deleted: u.deleted,
        }
    }
}

/// `name` is the display form used everywhere downstream: `#general` for
/// channels, `@login` for IMs, the raw label for group DMs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_ext_shared: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub last_read: String,
}

#[derive(Debug, Default)]
pub struct UsersCache {
    pub users: HashMap<String, CachedUser>,
    pub users_inv: HashMap<String, String>,
}

impl UsersCache {
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a wire::User>) -> Self {
        let mut cache = UsersCache::default();
        for u in users {
            cache.insert(CachedUser::from(u));
        }
        cache
    }

    fn insert(&mut self, user: CachedUser) {
        if !user.name.is_empty() {
            if let Some(existing) = self.users_inv.get(&user.name) {
                if existing != &user.id {
                    warn!(
                        handle = %user.name,
                        kept = %existing,
                        dropped = %user.id,
                        "duplicate user handle; first seen wins"
                    );
                }
            } else {
                self.users_inv.insert(user.name.clone(), user.id.clone());
            }
        }
        self.users.insert(user.id.clone(), user);
    }

    fn from_map(users: HashMap<String, CachedUser>) -> Self {
        let mut ordered: Vec<CachedUser> = users.into_values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let mut cache = UsersCache::default();
        for u in ordered {
            cache.insert(u);
        }
        cache
    }

    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<HashMap<String, CachedUser>>(&raw) {
            Ok(map) => {
                debug!(path = %path.display(), count = map.len(), "loaded users cache");
                Some(Self::from_map(map))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "users cache undecodable; ignoring");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ServerError> {
        write_atomic(path, &self.users)
    }
}

#[derive(Debug, Default)]
pub struct ChannelsCache {
    pub channels: HashMap<String, CachedChannel>,
    pub channels_inv: HashMap<String, String>,
}

impl ChannelsCache {
    /// Build the store from API channel objects, resolving IM display
    /// names through the users directory. An IM whose counterparty is not
    /// cached yet is indexed by `@<user_id>` until a later refresh.
    pub fn from_channels<'a>(
        channels: impl IntoIterator<Item = &'a wire::Channel>,
        users: &UsersCache,
    ) -> Self {
        let mut cache = ChannelsCache::default();
        for ch in channels {
            let name = display_name(ch, users);
            cache.insert(CachedChannel {
                id: ch.id.clone(),
                name,
                topic: ch.topic.value.clone(),
                purpose: ch.purpose.value.clone(),
                member_count: ch.num_members,
                is_private: ch.is_private,
                is_im: ch.is_im,
                is_mpim: ch.is_mpim,
                is_ext_shared: ch.is_ext_shared,
                user: ch.user.clone(),
                last_read: ch.last_read.clone(),
            });
        }
        cache
    }

    fn insert(&mut self, channel: CachedChannel) {
        if !channel.name.is_empty() {
            if let Some(existing) = self.channels_inv.get(&channel.name) {
                if existing != &channel.id {
                    warn!(
                        name = %channel.name,
                        kept = %existing,
                        dropped = %channel.id,
                        "duplicate channel display name; first seen wins"
                    );
                }
            } else {
                self.channels_inv
                    .insert(channel.name.clone(), channel.id.clone());
            }
        }
        self.channels.insert(channel.id.clone(), channel);
    }

    fn from_map(channels: HashMap<String, CachedChannel>) -> Self {
        let mut ordered: Vec<CachedChannel> = channels.into_values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let mut cache = ChannelsCache::default();
        for ch in ordered {
            cache.insert(ch);
        }
        cache
    }

    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<HashMap<String, CachedChannel>>(&raw) {
            Ok(map) => {
                debug!(path = %path.display(), count = map.len(), "loaded channels cache");
                Some(Self::from_map(map))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "channels cache undecodable; ignoring");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ServerError> {
        write_atomic(path, &self.channels)
    }
}

fn display_name(ch: &wire::Channel, users: &UsersCache) -> String {
    if ch.is_im {
        if let Some(u) = users.users.get(&ch.user) {
            return format!("@{}", u.name);
        }
        if !ch.user.is_empty() {
            return format!("@{}", ch.user);
        }
        return ch.id.clone();
    }
    if ch.is_mpim {
        return ch.name.clone();
    }
    if ch.name.starts_with('#') {
        ch.name.clone()
    } else {
        format!("#{}", ch.name)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ServerError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec(value)?;
    std::fs::write(&tmp, &data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slack-mcp-server")
}

pub fn users_cache_path() -> PathBuf {
    let overridden = config::env(config::ENV_USERS_CACHE);
    if !overridden.is_empty() {
        return PathBuf::from(overridden);
    }
    cache_dir().join(USERS_CACHE_FILE)
}

pub fn channels_cache_path() -> PathBuf {
    let overridden = config::env(config::ENV_CHANNELS_CACHE);
    if !overridden.is_empty() {
        return PathBuf::from(overridden);
    }
    cache_dir().join(CHANNELS_CACHE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> wire::User {
        wire::User {
            id: id.to_string(),
            name: name.to_string(),
            real_name: format!("Real {}", name),
            ..Default::default()
        }
    }

    fn channel(id: &str, name: &str) -> wire::Channel {
        wire::Channel {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn inverse_maps_channels_with_hash_prefix() {
        let users = UsersCache::default();
        let chans = vec![channel("C1", "general")];
        let cache = ChannelsCache::from_channels(&chans, &users);
        assert_eq!(cache.channels_inv.get("#general"), Some(&"C1".to_string()));
        assert_eq!(cache.channels["C1"].name, "#general");
    }

    #[test]
    fn im_resolves_through_users_cache() {
        let wire_users = vec![user("U1", "alice")];
        let users = UsersCache::from_users(&wire_users);
        let mut im = channel("D1", "");
        im.is_im = true;
        im.user = "U1".to_string();
        let cache = ChannelsCache::from_channels(&[im], &users);
        assert_eq!(cache.channels_inv.get("@alice"), Some(&"D1".to_string()));
    }

    #[test]
    fn im_falls_back_to_user_id_when_unresolved() {
        let users = UsersCache::default();
        let mut im = channel("D2", "");
        im.is_im = true;
        im.user = "U404".to_string();
        let cache = ChannelsCache::from_channels(&[im], &users);
        assert_eq!(cache.channels_inv.get("@U404"), Some(&"D2".to_string()));
    }

    #[test]
    fn duplicate_display_name_first_wins() {
        let users = UsersCache::default();
        let chans = vec![channel("C1", "dev"), channel("C2", "dev")];
        let cache = ChannelsCache::from_channels(&chans, &users);
        assert_eq!(cache.channels_inv.get("#dev"), Some(&"C1".to_string()));
        assert_eq!(cache.channels.len(), 2, "both channels stay addressable by id");
    }

    #[test]
    fn mpim_keeps_raw_label() {
        let users = UsersCache::default();
        let mut mpim = channel("G1", "mpdm-alice--bob--carol-1");
        mpim.is_mpim = true;
        let cache = ChannelsCache::from_channels(&[mpim], &users);
        assert_eq!(
            cache.channels_inv.get("mpdm-alice--bob--carol-1"),
            Some(&"G1".to_string())
        );
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("slackmcp-cache-test-{}", std::process::id()));
        let path = dir.join(CHANNELS_CACHE_FILE);
        let users = UsersCache::default();
        let cache = ChannelsCache::from_channels(&[channel("C1", "general")], &users);
        cache.save(&path).unwrap();

        let loaded = ChannelsCache::load(&path).unwrap();
        assert_eq!(loaded.channels["C1"].name, "#general");
        assert_eq!(loaded.channels_inv.get("#general"), Some(&"C1".to_string()));
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_a_miss() {
        assert!(ChannelsCache::load(Path::new("/nonexistent/channels_cache_v2.json")).is_none());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let dir = std::env::temp_dir().join(format!("slackmcp-cache-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(USERS_CACHE_FILE);
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(UsersCache::load(&path).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
