use serde::{Deserialize, Serialize};

use crate::utils::{format_date, truncate_string};

/// A post's author as embedded in post responses and returned by
/// `GET /author/{id}`.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub cover_image_url: String,
    pub author_id: u64,
    pub author: Option<Author>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Post {
    /// Author's username, or a placeholder when the server did not embed one
    pub fn author_name(&self) -> &str {
        match &self.author {
            Some(author) if !author.username.is_empty() => &author.username,
            _ => "unknown",
        }
    }

    pub fn display_date(&self) -> String {
        self.created_at
            .as_deref()
            .map(format_date)
            .unwrap_or_else(|| "-".to_string())
    }

    /// One-line preview of the content for list views
    pub fn excerpt(&self, max_len: usize) -> String {
        let first_line = self.content.lines().next().unwrap_or_default();
        truncate_string(first_line.trim(), max_len)
    }
}

/// Body for `POST /posts` and `PUT /posts/{id}`.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PostPayload {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover_image_url: String,
}

impl From<&Post> for PostPayload {
    fn from(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            content: post.content.clone(),
            cover_image_url: post.cover_image_url.clone(),
        }
    }
}
