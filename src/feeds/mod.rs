pub mod format;
pub mod keywords;
pub mod poller;
pub mod prober;

use async_trait::async_trait;

/// Network-backed checks used while validating `add`, `update` and `test`.
#[async_trait]
pub trait FeedProber: Send + Sync {
    /// Whether the URL itself serves a feed with at least one entry
    async fn is_already_feed(&self, url: &str) -> bool;

    /// Candidate feed URLs advertised by the page, best first.
    ///
    /// Fetch failures yield an empty list.
    async fn discover_feeds(&self, url: &str) -> Vec<String>;
}
