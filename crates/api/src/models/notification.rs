//! Advertisements, announcements, and user inboxes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freshmilk_core::{AdPosition, AdvertisementId, MessageId, MessageType, UserId, UserMessageId};

use super::user::default_true;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Advertisement {
    pub id: AdvertisementId,
    pub title: String,
    pub image: String,
    pub link: String,
    pub link_type: String,
    pub link_id: Option<i32>,
    pub position: AdPosition,
    pub sort_order: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertisementInput {
    pub title: String,
    pub image: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub link_type: String,
    pub link_id: Option<i32>,
    #[serde(default = "default_position")]
    pub position: AdPosition,
    #[serde(default)]
    pub sort_order: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_position() -> AdPosition {
    AdPosition::HomeBanner
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub title: String,
    pub content: String,
    pub message_type: MessageType,
    pub image: String,
    pub link: String,
    pub is_global: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageInput {
    pub title: String,
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_message_type() -> MessageType {
    MessageType::System
}

/// A message delivered to one user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserMessage {
    pub id: UserMessageId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub title: String,
    pub content: String,
    pub message_type: MessageType,
    pub image: String,
    pub link: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
