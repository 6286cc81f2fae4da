//! Turns a mention into a [`ParsedCommand`].
//!
//! The bot's handle must be the very first token; anything else is an
//! organic mention and yields [`CommandError::NoCommand`]. A quoted phrase
//! anywhere in the text becomes the feed name and is removed before the
//! remaining words are tokenized.

use std::collections::VecDeque;

use tracing::debug;

use super::text::{
    extract_quoted_name, html_to_text, is_valid_slug, is_valid_url, remove_self_handle, slugify,
};
use super::{Action, Command, CommandError, ParsedCommand};
use crate::feeds::FeedProber;
use crate::platform::Mention;
use crate::storage::registry::FeedRegistry;

type Complements = Result<Command, CommandError>;

pub struct MentionParser<'a> {
    /// The bot's own handle
    me: &'a str,
    registry: &'a FeedRegistry,
    prober: &'a dyn FeedProber,
}

impl<'a> MentionParser<'a> {
    pub fn new(me: &'a str, registry: &'a FeedRegistry, prober: &'a dyn FeedProber) -> Self {
        Self {
            me,
            registry,
            prober,
        }
    }

    pub async fn parse(&self, mention: &Mention) -> ParsedCommand {
        let text = html_to_text(&mention.content);

        let (position, text) = remove_self_handle(&text, self.me);
        if position != Some(0) {
            debug!("Organic mention (handle at {:?}), no command", position);
            return ParsedCommand::failed(None, CommandError::NoCommand);
        }

        let (name, text) = extract_quoted_name(&text);
        let mut words: VecDeque<&str> = text.split_whitespace().collect();

        let Some(verb) = words.pop_front() else {
            return ParsedCommand::failed(None, CommandError::NoCommand);
        };
        let Some(action) = Action::from_token(verb) else {
            debug!("Unknown verb: {}", verb);
            return ParsedCommand::failed(None, CommandError::InvalidAction);
        };
        debug!("Got an action: {}", action);

        let complements = match action {
            Action::Hello => Ok(Command::Hello),
            Action::List => Ok(Command::List),
            Action::Add => self.parse_add(&mut words, name).await,
            Action::Update => self.parse_update(&mut words, name).await,
            Action::Remove => self.parse_remove(&mut words),
            Action::Test => self.parse_test(&mut words).await,
        };

        ParsedCommand {
            action: Some(action),
            result: complements,
        }
    }

    async fn parse_add(&self, words: &mut VecDeque<&str>, name: Option<String>) -> Complements {
        let site_url = words.pop_front().ok_or(CommandError::MissingParams)?;
        let feed_url = self.resolve_feed(site_url).await?;

        let alias = match words.pop_front() {
            Some(alias) => {
                if !is_valid_slug(alias) {
                    return Err(CommandError::InvalidAlias);
                }
                alias.to_string()
            }
            None => slugify(&feed_url),
        };
        if self.registry.exists(&alias) {
            return Err(CommandError::AliasAlreadyExists);
        }

        Ok(Command::Add {
            alias,
            site_url: site_url.to_string(),
            feed_url,
            name,
        })
    }

    async fn parse_update(&self, words: &mut VecDeque<&str>, name: Option<String>) -> Complements {
        let alias = words.pop_front().ok_or(CommandError::MissingParams)?;
        if !self.registry.exists(alias) {
            return Err(CommandError::NotFoundAlias);
        }

        let site_url = words.pop_front().ok_or(CommandError::MissingParams)?;
        let feed_url = self.resolve_feed(site_url).await?;

        Ok(Command::Update {
            alias: alias.to_string(),
            site_url: site_url.to_string(),
            feed_url,
            name,
        })
    }

    fn parse_remove(&self, words: &mut VecDeque<&str>) -> Complements {
        let alias = words.pop_front().ok_or(CommandError::MissingParams)?;
        if !self.registry.exists(alias) {
            return Err(CommandError::NotFoundAlias);
        }

        Ok(Command::Remove {
            alias: alias.to_string(),
        })
    }

    async fn parse_test(&self, words: &mut VecDeque<&str>) -> Complements {
        let site_url = words.pop_front().ok_or(CommandError::MissingParams)?;
        let feed_url = self.resolve_feed(site_url).await?;

        Ok(Command::Test {
            site_url: site_url.to_string(),
            feed_url,
        })
    }

    /// The URL itself when it already is a feed, else the first discovered one.
    async fn resolve_feed(&self, site_url: &str) -> Result<String, CommandError> {
        if !is_valid_url(site_url) {
            return Err(CommandError::InvalidUrl);
        }

        if self.prober.is_already_feed(site_url).await {
            return Ok(site_url.to_string());
        }

        self.prober
            .discover_feeds(site_url)
            .await
            .into_iter()
            .next()
            .ok_or(CommandError::InvalidRss)
    }
}

/// Re-checks the alias of a parsed write command against a freshly loaded
/// registry, which may have changed while the mention was being parsed.
pub fn recheck_alias(parsed: ParsedCommand, registry: &FeedRegistry) -> ParsedCommand {
    let conflict = match parsed.command() {
        Some(Command::Add { alias, .. }) if registry.exists(alias) => {
            Some(CommandError::AliasAlreadyExists)
        }
        Some(Command::Update { alias, .. } | Command::Remove { alias }) if !registry.exists(alias) => {
            Some(CommandError::NotFoundAlias)
        }
        _ => None,
    };

    match conflict {
        Some(error) => {
            debug!("Registry changed while parsing: {}", error);
            ParsedCommand::failed(parsed.action, error)
        }
        None => parsed,
    }
}
