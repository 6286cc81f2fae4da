//! Streaming listener: answers mentions one at a time, reconnecting
//! forever when the stream drops.

use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info};

use crate::commands::executor::CommandExecutor;
use crate::commands::parser::{recheck_alias, MentionParser};
use crate::config::Config;
use crate::feeds::prober::{build_http_client, HttpProber};
use crate::feeds::FeedProber;
use crate::platform::mastodon::MastodonClient;
use crate::platform::{Mention, StatusPublisher};
use crate::storage::lock::StorageLock;
use crate::storage::registry::FeedRegistry;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Parses, executes and answers a single mention.
pub struct MentionHandler<'a> {
    config: &'a Config,
    prober: &'a dyn FeedProber,
    publisher: &'a dyn StatusPublisher,
}

impl<'a> MentionHandler<'a> {
    pub fn new(
        config: &'a Config,
        prober: &'a dyn FeedProber,
        publisher: &'a dyn StatusPublisher,
    ) -> Self {
        Self {
            config,
            prober,
            publisher,
        }
    }

    /// Parsing may hit the network, so it runs against an unlocked snapshot
    /// of the registry. Only write commands take the storage lock, reload the
    /// registry and re-check the alias before executing.
    pub async fn handle(&self, mention: &Mention) -> Result<()> {
        info!("Mention {} from {}", mention.status_id, mention.username);

        let snapshot = FeedRegistry::load(&self.config.feed_parser.storage_file)?;
        let parsed = MentionParser::new(&self.config.app.user, &snapshot, self.prober)
            .parse(mention)
            .await;
        debug!("Parsed mention: {:?}", parsed);

        let executor = CommandExecutor::new(&self.config.app);
        let reply = if parsed.command().is_some_and(|c| c.action().is_write()) {
            let _lock = StorageLock::acquire(
                &self.config.storage.lock_file,
                Duration::from_secs(self.config.storage.lock_timeout_secs),
            )
            .await?;

            let mut registry = FeedRegistry::load(&self.config.feed_parser.storage_file)?;
            let parsed = recheck_alias(parsed, &registry);
            executor.execute(&parsed, mention, &mut registry)?
        } else {
            let mut registry = snapshot;
            executor.execute(&parsed, mention, &mut registry)?
        };

        self.publisher
            .publish_status(&reply)
            .await
            .with_context(|| format!("Failed to reply to {}", mention.status_id))?;
        Ok(())
    }
}

/// Consumes one connection of the notification stream until it ends.
async fn listen_once(client: &MastodonClient, handler: &MentionHandler<'_>) -> Result<()> {
    let mut notifications = pin!(client.stream_notifications().await?);
    info!("Listening for mentions");

    while let Some(notification) = notifications.next().await {
        let Some(mention) = notification?.into_mention() else {
            continue;
        };
        if let Err(e) = handler.handle(&mention).await {
            error!("Failed to handle mention {}: {:#}", mention.status_id, e);
        }
    }

    anyhow::bail!("Notification stream closed")
}

/// Runs the listener forever.
pub async fn run(config: &Config) -> Result<()> {
    info!("{} listener starting as {}", config.app.name, config.app.user);

    let http = build_http_client()?;
    let prober = HttpProber::new(http);
    let client = MastodonClient::new(config.mastodon.clone(), config.publisher.dry_run);
    let handler = MentionHandler::new(config, &prober, &client);

    loop {
        if let Err(e) = listen_once(&client, &handler).await {
            error!("Listener error: {:#}", e);
        }
        info!("Reconnecting in {:?}", RECONNECT_DELAY);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
