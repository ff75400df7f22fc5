//! Server-side loader for the single-post page.
//!
//! Fetches one post by route identifier and hands the payload to the
//! rendering layer as `{"post": ...}`. Failures become a `PageError` with
//! an HTTP status and a user-facing message:
//!
//! - the server answered with a status: that status, "post not found"
//! - no status at all (network failure, timeout, unreadable body): 500,
//!   "try again later"

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::Locale;
use crate::models::Post;

/// Status used when the upstream failure carries none
pub const FALLBACK_STATUS: u16 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMessages {
    pub not_found: String,
    pub unavailable: String,
}

impl PageMessages {
    pub fn for_locale(locale: Locale) -> Self {
        match locale {
            Locale::ZhTw => Self {
                not_found: "找不到這篇文章".to_string(),
                unavailable: "無法從伺服器載入文章，請稍後再試。".to_string(),
            },
            Locale::En => Self {
                not_found: "Post not found".to_string(),
                unavailable: "Could not load the post from the server. Please try again later."
                    .to_string(),
            },
        }
    }
}

impl Default for PageMessages {
    fn default() -> Self {
        Self::for_locale(Locale::default())
    }
}

/// Data handed to the post page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostPage {
    pub post: Value,
}

impl PostPage {
    /// Decode the payload into a typed `Post`
    pub fn typed(&self) -> Result<Post, serde_json::Error> {
        Post::deserialize(&self.post)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{status}: {message}")]
pub struct PageError {
    pub status: u16,
    pub message: String,
}

impl PageError {
    pub fn from_api_error(err: &ApiError, messages: &PageMessages) -> Self {
        match err.status() {
            Some(status) => Self {
                status,
                message: messages.not_found.clone(),
            },
            None => Self {
                status: FALLBACK_STATUS,
                message: messages.unavailable.clone(),
            },
        }
    }
}

pub struct PostLoader {
    api: ApiClient,
    messages: PageMessages,
}

impl PostLoader {
    pub fn new(api: ApiClient, messages: PageMessages) -> Self {
        Self { api, messages }
    }

    pub async fn load(&self, id: &str) -> Result<PostPage, PageError> {
        match self.api.get_post(id).await {
            Ok(response) => {
                debug!(id, "Post loaded");
                Ok(PostPage {
                    post: response.data(),
                })
            }
            Err(e) => {
                let page_error = PageError::from_api_error(&e, &self.messages);
                warn!(id, error = %e, status = page_error.status, "Failed to load post");
                Err(page_error)
            }
        }
    }
}
