pub mod mastodon;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

/// A mention received from the notification stream
#[derive(Debug, Clone)]
pub struct Mention {
    /// Status to reply to
    pub status_id: String,
    /// Raw HTML content of the status
    pub content: String,
    /// Sender handle without the leading `@`
    pub username: String,
    pub visibility: Visibility,
}

/// An image to attach to a status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// A status ready to be sent to the instance
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusPost {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoiler_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_ids: Vec<String>,
    pub visibility: Visibility,
}

impl StatusPost {
    pub fn text(status: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            status: status.into(),
            spoiler_text: None,
            language: None,
            in_reply_to_id: None,
            media_ids: Vec::new(),
            visibility,
        }
    }
}

/// What the instance answers after publishing or reblogging
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PublishedStatus {
    pub id: String,
}

/// Outbound transport for statuses.
///
/// Returns `None` when nothing was sent (dry run).
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(&self, post: &StatusPost) -> Result<Option<PublishedStatus>>;

    async fn reblog(&self, status_id: &str) -> Result<Option<PublishedStatus>>;

    /// Uploads the media and returns its id on the instance
    async fn upload_media(&self, media: &MediaAttachment) -> Result<Option<String>>;
}
