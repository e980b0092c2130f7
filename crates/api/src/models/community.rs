//! Product reviews, topics, and community posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use freshmilk_core::{CommentId, OrderId, PostId, PostTab, ProductId, TopicId, UserId};

use super::user::default_true;

/// A product review.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub username: String,
    pub user_avatar: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub order_id: Option<OrderId>,
    pub rating: i16,
    pub content: String,
    pub images: Json<Vec<String>>,
    pub likes: i32,
    pub is_anonymous: bool,
    pub is_approved: bool,
    pub reply: String,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Hide the author of an anonymous review.
    #[must_use]
    pub fn masked(mut self) -> Self {
        if self.is_anonymous {
            self.username = mask_name(&self.username);
            self.user_avatar = String::new();
        }
        self
    }
}

/// Keep the first character of a name and star the rest.
#[must_use]
pub fn mask_name(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(
        || "匿名用户".to_owned(),
        |first| format!("{first}***"),
    )
}

/// Review submission.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub rating: i16,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Filters for review lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFilter {
    pub product_id: Option<ProductId>,
    pub is_approved: Option<bool>,
    pub rating: Option<i16>,
    pub rating_min: Option<i16>,
    pub rating_max: Option<i16>,
    pub has_reply: Option<bool>,
    pub has_images: Option<bool>,
    pub search: Option<String>,
}

/// A community topic.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub image: String,
    pub description: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Topic fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicInput {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

/// A community post.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub username: String,
    pub user_avatar: String,
    pub topic_id: Option<TopicId>,
    pub topic_name: Option<String>,
    pub tab: PostTab,
    pub content: String,
    pub image: String,
    pub images: Json<Vec<String>>,
    pub likes: i32,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Post submission.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePost {
    pub topic_id: Option<TopicId>,
    #[serde(default = "default_tab")]
    pub tab: PostTab,
    pub content: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub images: Vec<String>,
}

const fn default_tab() -> PostTab {
    PostTab::Recommended
}

/// Filters for post lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub tab: Option<PostTab>,
    pub topic_id: Option<TopicId>,
    pub user_id: Option<UserId>,
    pub is_approved: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_name() {
        assert_eq!(mask_name("张三丰"), "张***");
        assert_eq!(mask_name("bob"), "b***");
        assert_eq!(mask_name(""), "匿名用户");
    }
}
