//! Customer feedback tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use freshmilk_core::{FeedbackId, FeedbackStatus, FeedbackType, UserId};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Feedback {
    pub id: FeedbackId,
    pub user_id: UserId,
    pub username: String,
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    pub images: Json<Vec<String>>,
    pub contact: String,
    pub status: FeedbackStatus,
    pub reply: String,
    pub replied_by: Option<UserId>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeedback {
    #[serde(default = "default_type")]
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub contact: String,
}

const fn default_type() -> FeedbackType {
    FeedbackType::Suggestion
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackFilter {
    pub status: Option<FeedbackStatus>,
    pub feedback_type: Option<FeedbackType>,
}
