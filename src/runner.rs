//! Batch entry points: the polling cycle, a queue-only drain and a test
//! publication. Each one holds the storage lock for its whole duration.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::feeds::poller::FeedPoller;
use crate::feeds::prober::build_http_client;
use crate::platform::mastodon::MastodonClient;
use crate::platform::{StatusPost, StatusPublisher};
use crate::publisher::QueuePublisher;
use crate::storage::lock::StorageLock;
use crate::storage::queue::PostQueue;
use crate::storage::registry::FeedRegistry;

const TEST_STATUS: &str = "This is a test";

async fn lock_storage(config: &Config) -> Result<StorageLock> {
    StorageLock::acquire(
        &config.storage.lock_file,
        Duration::from_secs(config.storage.lock_timeout_secs),
    )
    .await
}

fn mastodon_client(config: &Config) -> MastodonClient {
    MastodonClient::new(config.mastodon.clone(), config.publisher.dry_run)
}

/// One full polling and publishing cycle.
pub async fn run_cycle(config: &Config) -> Result<()> {
    let http = build_http_client()?;
    let client = mastodon_client(config);
    run_cycle_with(config, &http, &client).await?;
    Ok(())
}

/// Polls every feed into the queue, then drains it. Returns how many queued
/// items were published.
pub async fn run_cycle_with(
    config: &Config,
    http: &reqwest::Client,
    publisher: &dyn StatusPublisher,
) -> Result<usize> {
    info!("{} polling cycle", config.app.name);
    let _lock = lock_storage(config).await?;

    let mut registry = FeedRegistry::load(&config.feed_parser.storage_file)?;
    let mut queue = PostQueue::load(&config.queue_storage.file)?;

    let appended = FeedPoller::new(config, http)
        .poll_all(&mut registry, &mut queue)
        .await;
    info!("Queued {} new post(s) from {} feed(s)", appended, registry.len());

    queue.deduplicate();
    queue.sort();
    // Entries are only marked seen once the queue holding them is stored
    queue.save()?;
    registry.save()?;

    QueuePublisher::new(publisher, config).drain(&mut queue).await
}

/// Drains the queue without polling.
pub async fn publish_queue(config: &Config) -> Result<()> {
    let client = mastodon_client(config);
    publish_queue_with(config, &client).await?;
    Ok(())
}

pub async fn publish_queue_with(config: &Config, publisher: &dyn StatusPublisher) -> Result<usize> {
    info!("Publishing whole queue");
    let _lock = lock_storage(config).await?;
    let mut queue = PostQueue::load(&config.queue_storage.file)?;
    QueuePublisher::new(publisher, config).drain(&mut queue).await
}

/// Publishes a fixed status to check the credentials.
pub async fn publish_test(config: &Config) -> Result<()> {
    let client = mastodon_client(config);
    publish_test_with(config, &client).await
}

pub async fn publish_test_with(config: &Config, publisher: &dyn StatusPublisher) -> Result<()> {
    info!("Publishing test message");
    let mut status = StatusPost::text(TEST_STATUS, config.mastodon.visibility);
    status.language = Some(config.feed_parser.language_default.clone());

    match publisher.publish_status(&status).await? {
        Some(published) => info!("Test status published with id {}", published.id),
        None => info!("Dry run, test status not sent"),
    }
    Ok(())
}
