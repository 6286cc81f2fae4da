//! Drains the post queue through a [`StatusPublisher`].

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::platform::{StatusPost, StatusPublisher, Visibility};
use crate::storage::queue::{PostAction, PostQueue, QueuedPost};

pub struct QueuePublisher<'a> {
    publisher: &'a dyn StatusPublisher,
    visibility: Visibility,
    only_oldest: bool,
    dry_run: bool,
}

impl<'a> QueuePublisher<'a> {
    pub fn new(publisher: &'a dyn StatusPublisher, config: &Config) -> Self {
        Self {
            publisher,
            visibility: config.mastodon.visibility,
            only_oldest: config.publisher.only_oldest(),
            dry_run: config.publisher.dry_run,
        }
    }

    /// Publishes from the front of the queue and returns how many items were
    /// handled.
    ///
    /// Items sharing a `group_id` with the next one are always published
    /// together; otherwise `only_oldest` stops after one. The queue file is
    /// rewritten only after the loop, so a failure leaves every item on disk
    /// and the next drain retries it.
    pub async fn drain(&self, queue: &mut PostQueue) -> Result<usize> {
        if queue.is_empty() {
            info!("The queue is empty, skipping");
            return Ok(0);
        }

        let mut handled = 0;
        let mut previous_id: Option<String> = None;
        while let Some(post) = queue.pop() {
            let published_id = self
                .execute(&post, previous_id.as_deref())
                .await
                .with_context(|| format!("Failed to publish queued post {}", post.id))?;
            handled += 1;

            let continues_group = post.group_id.is_some()
                && queue.first().is_some_and(|next| next.group_id == post.group_id);

            if continues_group {
                debug!("More posts in group {:?}, continuing", post.group_id);
                if published_id.is_some() {
                    previous_id = published_id;
                }
                continue;
            }

            previous_id = None;
            if self.only_oldest {
                info!("Publishing only the oldest post, finishing");
                break;
            }
        }

        if self.dry_run {
            debug!("Dry run, queue file left untouched");
        } else {
            queue.save()?;
        }

        info!("Published {} post(s), {} left in the queue", handled, queue.len());
        Ok(handled)
    }

    async fn execute(&self, post: &QueuedPost, previous_id: Option<&str>) -> Result<Option<String>> {
        match post.action {
            PostAction::Reblog => {
                info!("Reblogging status {}", post.id);
                let result = self.publisher.reblog(&post.id).await?;
                Ok(result.map(|status| status.id))
            }
            PostAction::New => {
                let Some(text) = post.text.as_deref() else {
                    warn!(
                        "Queued post {} published at {} has no text, skipping",
                        post.id, post.published_at
                    );
                    return Ok(None);
                };

                let mut media_ids = Vec::with_capacity(post.media.len());
                for media in &post.media {
                    if let Some(id) = self.publisher.upload_media(media).await? {
                        media_ids.push(id);
                    }
                }

                let status = StatusPost {
                    status: text.to_string(),
                    spoiler_text: post.summary.clone(),
                    language: post.language.clone(),
                    in_reply_to_id: previous_id
                        .map(str::to_string)
                        .or_else(|| post.in_reply_to_id.clone()),
                    media_ids,
                    visibility: self.visibility,
                };

                let result = self.publisher.publish_status(&status).await?;
                if let Some(published) = &result {
                    debug!("Post was published with id {}", published.id);
                }
                Ok(result.map(|status| status.id))
            }
        }
    }
}
