use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{read_yaml, write_yaml};

/// One subscribed feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRecord {
    pub site_url: String,
    pub feed_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entry ids already turned into posts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls_seen: Vec<String>,
}

impl FeedRecord {
    pub fn new(site_url: impl Into<String>, feed_url: impl Into<String>, name: Option<String>) -> Self {
        Self {
            site_url: site_url.into(),
            feed_url: feed_url.into(),
            name,
            urls_seen: Vec::new(),
        }
    }
}

/// Alias → feed mapping persisted as YAML. Every mutation is followed by an
/// explicit [`FeedRegistry::save`] by the caller.
#[derive(Debug)]
pub struct FeedRegistry {
    path: PathBuf,
    feeds: BTreeMap<String, FeedRecord>,
}

impl FeedRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let feeds: BTreeMap<String, FeedRecord> = read_yaml(path)?;
        debug!("Loaded {} feed(s) from {}", feeds.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            feeds,
        })
    }

    pub fn save(&self) -> Result<()> {
        write_yaml(&self.path, &self.feeds)
    }

    pub fn get(&self, alias: &str) -> Option<&FeedRecord> {
        self.feeds.get(alias)
    }

    pub fn exists(&self, alias: &str) -> bool {
        self.feeds.contains_key(alias)
    }

    pub fn set(&mut self, alias: &str, record: FeedRecord) {
        self.feeds.insert(alias.to_string(), record);
    }

    pub fn delete(&mut self, alias: &str) -> Option<FeedRecord> {
        self.feeds.remove(alias)
    }

    /// All records, ordered by alias
    pub fn all(&self) -> impl Iterator<Item = (&String, &FeedRecord)> {
        self.feeds.iter()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn is_seen(&self, alias: &str, id: &str) -> bool {
        self.feeds
            .get(alias)
            .is_some_and(|record| record.urls_seen.iter().any(|seen| seen == id))
    }

    /// Appends ids not yet seen. Unknown aliases are ignored.
    pub fn mark_seen(&mut self, alias: &str, ids: &[String]) {
        if let Some(record) = self.feeds.get_mut(alias) {
            for id in ids {
                if !record.urls_seen.contains(id) {
                    record.urls_seen.push(id.clone());
                }
            }
        }
    }
}
