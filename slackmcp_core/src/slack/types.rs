//! Wire types for Slack's Web API and edge API responses.
//!
//! Fields are limited to what the server actually consumes; everything
//! else is dropped at deserialization. All structs default missing fields
//! so the same shapes survive Slack's per-endpoint inconsistencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTestResponse {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicOrPurpose {
    #[serde(default)]
    pub value: String,
}

/// A channel as returned by `conversations.list`, `users.conversations`
/// and `conversations.info`. `latest` is a full message object only on
/// `conversations.info`; elsewhere it is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: TopicOrPurpose,
    #[serde(default)]
    pub purpose: TopicOrPurpose,
    #[serde(default)]
    pub num_members: i64,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_ext_shared: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub last_read: String,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub latest: Option<Box<Message>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct File {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub filetype: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url_private: String,
    #[serde(default)]
    pub url_private_download: String,
    #[serde(default)]
    pub permalink: String,
}

/// A message attachment's text parts (legacy attachments, link unfurls).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fallback: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot_profile: Option<BotProfile>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationsListResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersListResponse {
    #[serde(default)]
    pub members: Vec<User>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembersResponse {
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchChannelRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub channel: SearchChannelRef,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMatches {
    #[serde(default)]
    pub matches: Vec<SearchMessage>,
    #[serde(default)]
    pub pagination: SearchPagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub messages: SearchMatches,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostMessageResponse {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfoResponse {
    #[serde(default)]
    pub file: File,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactionsGetResponse {
    #[serde(default)]
    pub message: Message,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_create: i64,
    #[serde(default)]
    pub date_update: i64,
    #[serde(default)]
    pub user_count: i64,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserGroupsResponse {
    #[serde(default)]
    pub usergroups: Vec<UserGroup>,
}

/// One entry of a `client.counts` array. `last_read`/`latest` arrive as
/// Slack ts strings and are preserved verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountsEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub has_unreads: bool,
    #[serde(default)]
    pub mention_count: i64,
    #[serde(default)]
    pub last_read: String,
    #[serde(default)]
    pub latest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCountsResponse {
    #[serde(default)]
    pub channels: Vec<CountsEntry>,
    #[serde(default)]
    pub mpims: Vec<CountsEntry>,
    #[serde(default)]
    pub ims: Vec<CountsEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemField {
    #[serde(default)]
    pub column_id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub list_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub date_created: i64,
    #[serde(default)]
    pub updated_timestamp: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fields: Vec<ListItemField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsResponse {
    #[serde(default)]
    pub items: Vec<ListItem>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}
