//! Runs a parsed command against the feed registry and builds the reply.

use anyhow::Result;
use tracing::{info, warn};

use super::text::{normalize_handle, short_handle};
use super::{Command, CommandError, ParsedCommand};
use crate::config::AppConfig;
use crate::platform::{Mention, StatusPost};
use crate::storage::registry::{FeedRecord, FeedRegistry};

pub const HELP_TEXT: &str = "I am an RSS Feeder bot. You can use the following commands with me:\n\n\
add [site-url] [alias] \"[name]\" -> Will register a new RSS\n\
update [alias] [site-url] \"[name]\" -> Will change the URL for an alias\n\
remove [alias] -> Will remove the record\n\
test [site-url] -> Will test the URL searching for RSSs\n\
list -> Will show all the records I have";

const LIST_HEADER: &str = "The registered Feeds are:\n\n";
const LIST_EMPTY: &str = "No registers yet";

/// Whether `username` may run write commands.
///
/// A sender with a domain must match the admin's full handle; a bare sender
/// (local account) or a bare admin is compared by the user part only.
pub fn user_can_write(app: &AppConfig, username: &str) -> bool {
    if !app.restrict_writes {
        return true;
    }
    let Some(admin) = app.admin.as_deref() else {
        return false;
    };

    let sender = normalize_handle(username);
    let admin_full = normalize_handle(admin);
    if sender.is_empty() {
        return false;
    }

    if sender.contains('@') && admin_full.contains('@') {
        sender.eq_ignore_ascii_case(admin_full)
    } else {
        short_handle(sender).eq_ignore_ascii_case(short_handle(admin_full))
    }
}

pub struct CommandExecutor<'a> {
    app: &'a AppConfig,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(app: &'a AppConfig) -> Self {
        Self { app }
    }

    /// Produces the reply for one mention. Registry mutations are saved
    /// before returning; storage failures propagate.
    pub fn execute(
        &self,
        parsed: &ParsedCommand,
        mention: &Mention,
        registry: &mut FeedRegistry,
    ) -> Result<StatusPost> {
        let body = match &parsed.result {
            Err(CommandError::InvalidAction) => {
                format!("{}\n\n{}", CommandError::InvalidAction, HELP_TEXT)
            }
            Err(error) => error.to_string(),
            Ok(command) => self.run(command, mention, registry)?,
        };

        Ok(reply_to(mention, &body))
    }

    fn run(&self, command: &Command, mention: &Mention, registry: &mut FeedRegistry) -> Result<String> {
        if command.action().is_write() && !user_can_write(self.app, &mention.username) {
            warn!(
                "User {} is not allowed to {}",
                mention.username,
                command.action()
            );
            return Ok(CommandError::NotAllowed.to_string());
        }

        let body = match command {
            Command::Hello => HELP_TEXT.to_string(),
            Command::Add {
                alias,
                site_url,
                feed_url,
                name,
            } => {
                registry.set(alias, FeedRecord::new(site_url, feed_url, name.clone()));
                registry.save()?;
                info!("Added feed {} ({})", alias, feed_url);
                "Added".to_string()
            }
            Command::Update {
                alias,
                site_url,
                feed_url,
                name,
            } => {
                let mut record = registry
                    .get(alias)
                    .cloned()
                    .unwrap_or_else(|| FeedRecord::new(site_url, feed_url, None));
                record.site_url = site_url.clone();
                record.feed_url = feed_url.clone();
                if name.is_some() {
                    record.name = name.clone();
                }
                registry.set(alias, record);
                registry.save()?;
                info!("Updated feed {} ({})", alias, feed_url);
                "Updated".to_string()
            }
            Command::Remove { alias } => {
                registry.delete(alias);
                registry.save()?;
                info!("Removed feed {}", alias);
                "Removed".to_string()
            }
            Command::List => list_registers(registry),
            Command::Test { site_url, feed_url } => {
                if site_url == feed_url {
                    format!("The URL {} is already a valid feed", site_url)
                } else {
                    format!(
                        "The site URL {} appears to have a valid feed at {}",
                        site_url, feed_url
                    )
                }
            }
        };

        Ok(body)
    }
}

fn list_registers(registry: &FeedRegistry) -> String {
    if registry.is_empty() {
        return LIST_EMPTY.to_string();
    }

    let lines: Vec<String> = registry
        .all()
        .map(|(alias, record)| {
            format!(
                "[{}] {}: {} ({})",
                alias,
                record.name.as_deref().unwrap_or(alias),
                record.site_url,
                record.feed_url
            )
        })
        .collect();

    format!("{}{}", LIST_HEADER, lines.join("\n"))
}

fn reply_to(mention: &Mention, body: &str) -> StatusPost {
    let mut reply = StatusPost::text(format!("@{} {}", mention.username, body), mention.visibility);
    reply.in_reply_to_id = Some(mention.status_id.clone());
    reply
}
