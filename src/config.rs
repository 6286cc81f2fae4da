use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::platform::Visibility;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub feed_parser: FeedParserConfig,
    #[serde(default)]
    pub keywords_filter: KeywordsFilterConfig,
    #[serde(default)]
    pub queue_storage: QueueStorageConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The bot's own full handle, e.g. `@feeder@social.example`
    pub user: String,
    /// The only handle allowed to run write commands
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default = "default_true")]
    pub restrict_writes: bool,
    #[serde(default = "default_app_name")]
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MastodonConfig {
    pub api_base_url: String,
    pub access_token: String,
    /// Visibility of the posts published from the queue
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedParserConfig {
    #[serde(default = "default_feeds_file")]
    pub storage_file: PathBuf,
    #[serde(default = "default_language")]
    pub language_default: String,
    #[serde(default)]
    pub language_overwrite: bool,
    #[serde(default)]
    pub show_name: bool,
    #[serde(default = "default_max_summary_length")]
    pub max_summary_length: usize,
    #[serde(default = "default_true")]
    pub merge_content: bool,
    #[serde(default = "default_max_media")]
    pub max_media_per_status: usize,
    #[serde(default = "default_months_too_old")]
    pub months_too_old: u32,
    #[serde(default)]
    pub keywords_filter_profile: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KeywordsFilterConfig {
    #[serde(default)]
    pub profiles: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueStorageConfig {
    #[serde(default = "default_queue_file")]
    pub file: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PublisherConfig {
    #[serde(default)]
    pub only_oldest_post_every_iteration: Option<bool>,
    /// Legacy name of `only_oldest_post_every_iteration`
    #[serde(default)]
    pub only_older_toot: Option<bool>,
    #[serde(default)]
    pub dry_run: bool,
}

impl PublisherConfig {
    /// The new key wins over the legacy one; both absent means false.
    pub fn only_oldest(&self) -> bool {
        self.only_oldest_post_every_iteration
            .or(self.only_older_toot)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_cron")]
    pub cron: String,
}

fn default_true() -> bool {
    true
}

fn default_app_name() -> String {
    "MastoFeed".to_string()
}

fn default_feeds_file() -> PathBuf {
    PathBuf::from("storage/feeds.yaml")
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("storage/queue.yaml")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("storage/mastofeed.lock")
}

fn default_lock_timeout_secs() -> u64 {
    120
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_summary_length() -> usize {
    400
}

fn default_max_media() -> usize {
    4
}

fn default_months_too_old() -> u32 {
    6
}

fn default_cron() -> String {
    "0 */30 * * * *".to_string()
}

impl Default for FeedParserConfig {
    fn default() -> Self {
        Self {
            storage_file: default_feeds_file(),
            language_default: default_language(),
            language_overwrite: false,
            show_name: false,
            max_summary_length: default_max_summary_length(),
            merge_content: true,
            max_media_per_status: default_max_media(),
            months_too_old: default_months_too_old(),
            keywords_filter_profile: None,
        }
    }
}

impl Default for QueueStorageConfig {
    fn default() -> Self {
        Self {
            file: default_queue_file(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_file: default_lock_file(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { cron: default_cron() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;

        if config.app.user.trim().is_empty() {
            anyhow::bail!("[app] user must be set to the bot's own handle");
        }
        if config.app.restrict_writes && config.app.admin.is_none() {
            anyhow::bail!("[app] admin is required while restrict_writes is enabled");
        }

        Ok(config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> Config {
        Config::from_toml(MINIMAL).unwrap()
    }

    const MINIMAL: &str = r#"
[app]
user = "@feeder@social.example"
admin = "@xavi@social.example"

[mastodon]
api_base_url = "https://social.example"
access_token = "token"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert!(config.app.restrict_writes);
        assert_eq!(config.app.name, "MastoFeed");
        assert_eq!(
            config.feed_parser.storage_file,
            PathBuf::from("storage/feeds.yaml")
        );
        assert_eq!(config.queue_storage.file, PathBuf::from("storage/queue.yaml"));
        assert_eq!(config.feed_parser.max_summary_length, 400);
        assert!(config.feed_parser.merge_content);
        assert_eq!(config.mastodon.visibility, Visibility::Public);
        assert!(!config.publisher.only_oldest());
        assert!(!config.publisher.dry_run);
    }

    #[test]
    fn test_admin_required_when_restricted() {
        let content = MINIMAL.replace("admin = \"@xavi@social.example\"\n", "");
        assert!(Config::from_toml(&content).is_err());

        let content = content.replace(
            "[app]\n",
            "[app]\nrestrict_writes = false\n",
        );
        let config = Config::from_toml(&content).unwrap();
        assert!(!config.app.restrict_writes);
        assert!(config.app.admin.is_none());
    }

    #[test]
    fn test_empty_user_rejected() {
        let content = MINIMAL.replace("@feeder@social.example", " ");
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    fn test_legacy_only_older_toot() {
        let content = format!("{}\n[publisher]\nonly_older_toot = true\n", MINIMAL);
        let config = Config::from_toml(&content).unwrap();
        assert!(config.publisher.only_oldest());
    }

    #[test]
    fn test_new_only_oldest_key_wins() {
        let content = format!(
            "{}\n[publisher]\nonly_older_toot = true\nonly_oldest_post_every_iteration = false\n",
            MINIMAL
        );
        let config = Config::from_toml(&content).unwrap();
        assert!(!config.publisher.only_oldest());
    }

    #[test]
    fn test_keyword_profiles() {
        let content = format!(
            "{}\n[keywords_filter.profiles]\nrust = [\"rust\", \"cargo\"]\n",
            MINIMAL
        );
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(
            config.keywords_filter.profiles.get("rust").unwrap(),
            &vec!["rust".to_string(), "cargo".to_string()]
        );
    }
}
