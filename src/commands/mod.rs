//! Mention commands: parsing free-form mention text into a [`Command`] and
//! executing it against the feed registry.

pub mod executor;
pub mod parser;
pub mod text;

use std::fmt;

use thiserror::Error;

/// The fixed verb set understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hello,
    Add,
    Update,
    Remove,
    List,
    Test,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Hello,
        Action::Add,
        Action::Update,
        Action::Remove,
        Action::List,
        Action::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hello => "hello",
            Action::Add => "add",
            Action::Update => "update",
            Action::Remove => "remove",
            Action::List => "list",
            Action::Test => "test",
        }
    }

    /// Matches a verb token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(token))
    }

    /// Whether the action mutates the registry
    pub fn is_write(&self) -> bool {
        matches!(self, Action::Add | Action::Update | Action::Remove)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated command with its complements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello,
    Add {
        alias: String,
        site_url: String,
        feed_url: String,
        name: Option<String>,
    },
    Update {
        alias: String,
        site_url: String,
        feed_url: String,
        name: Option<String>,
    },
    Remove {
        alias: String,
    },
    List,
    Test {
        site_url: String,
        feed_url: String,
    },
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Hello => Action::Hello,
            Command::Add { .. } => Action::Add,
            Command::Update { .. } => Action::Update,
            Command::Remove { .. } => Action::Remove,
            Command::List => Action::List,
            Command::Test { .. } => Action::Test,
        }
    }
}

/// User-facing failures; the `Display` text is what the reply says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Hi! I am an RSS Feeder bot. Mention me starting with \"hello\" to see what I can do.")]
    NoCommand,
    #[error("I don't understand the action.")]
    InvalidAction,
    #[error("I need more parameters to perform this action.")]
    MissingParams,
    #[error("The given URL does not seem to be valid")]
    InvalidUrl,
    #[error("I could not get a valid RSS feed from the given URL")]
    InvalidRss,
    #[error("The alias can only be letters, numbers and hyphens")]
    InvalidAlias,
    #[error("The alias is already taken")]
    AliasAlreadyExists,
    #[error("I can't find that alias in my records")]
    NotFoundAlias,
    #[error("You are not allowed to perform this action")]
    NotAllowed,
}

/// Result of parsing one mention.
///
/// `action` is kept even when the complements failed validation, so the
/// reply can refer to it; no action always means an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub action: Option<Action>,
    pub result: Result<Command, CommandError>,
}

impl ParsedCommand {
    pub fn failed(action: Option<Action>, error: CommandError) -> Self {
        Self {
            action,
            result: Err(error),
        }
    }

    pub fn ok(command: Command) -> Self {
        Self {
            action: Some(command.action()),
            result: Ok(command),
        }
    }

    pub fn error(&self) -> Option<CommandError> {
        self.result.as_ref().err().copied()
    }

    pub fn command(&self) -> Option<&Command> {
        self.result.as_ref().ok()
    }
}
