use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{read_yaml, write_yaml};
use crate::platform::MediaAttachment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostAction {
    #[default]
    New,
    Reblog,
}

/// One pending outbound action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedPost {
    /// Source entry id; for reblogs, the status to reblog
    pub id: String,
    #[serde(default)]
    pub action: PostAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAttachment>,
    /// Posts sharing a group are published together as a thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
}

impl QueuedPost {
    pub fn new_post(id: impl Into<String>, text: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            action: PostAction::New,
            text: Some(text.into()),
            summary: None,
            language: None,
            media: Vec::new(),
            group_id: None,
            published_at,
            in_reply_to_id: None,
        }
    }

    pub fn reblog(status_id: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: status_id.into(),
            action: PostAction::Reblog,
            text: None,
            summary: None,
            language: None,
            media: Vec::new(),
            group_id: None,
            published_at,
            in_reply_to_id: None,
        }
    }
}

/// FIFO of queued posts persisted as a YAML list.
///
/// Popping only touches memory; nothing leaves the file until [`PostQueue::save`].
#[derive(Debug)]
pub struct PostQueue {
    path: PathBuf,
    items: VecDeque<QueuedPost>,
}

impl PostQueue {
    pub fn load(path: &Path) -> Result<Self> {
        let items: VecDeque<QueuedPost> = read_yaml(path)?;
        debug!("Loaded {} queued post(s) from {}", items.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            items,
        })
    }

    pub fn save(&self) -> Result<()> {
        write_yaml(&self.path, &self.items)?;
        debug!("Saved {} queued post(s) to {}", self.items.len(), self.path.display());
        Ok(())
    }

    pub fn append(&mut self, post: QueuedPost) {
        self.items.push_back(post);
    }

    pub fn pop(&mut self) -> Option<QueuedPost> {
        self.items.pop_front()
    }

    pub fn first(&self) -> Option<&QueuedPost> {
        self.items.front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedPost> {
        self.items.iter()
    }

    /// Drops later posts repeating the id, group and text of an earlier one.
    pub fn deduplicate(&mut self) {
        let mut seen = HashSet::new();
        let before = self.items.len();
        self.items.retain(|post| {
            seen.insert((post.id.clone(), post.group_id.clone(), post.text.clone()))
        });
        if before != self.items.len() {
            debug!("Removed {} duplicated post(s)", before - self.items.len());
        }
    }

    /// Oldest first. Stable, so thread members keep their order.
    pub fn sort(&mut self) {
        self.items.make_contiguous().sort_by_key(|post| post.published_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_fifo_and_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.yaml");

        let mut queue = PostQueue::load(&path).unwrap();
        queue.append(QueuedPost::new_post("a", "first", at(1)));
        queue.append(QueuedPost::reblog("109", at(2)));
        queue.save().unwrap();

        let mut reloaded = PostQueue::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.pop().unwrap().id, "a");
        let reblog = reloaded.pop().unwrap();
        assert_eq!(reblog.action, PostAction::Reblog);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_pop_without_save_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.yaml");

        let mut queue = PostQueue::load(&path).unwrap();
        queue.append(QueuedPost::new_post("a", "first", at(1)));
        queue.save().unwrap();
        queue.pop();

        assert_eq!(PostQueue::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_deduplicate_keeps_first() {
        let dir = tempdir().unwrap();
        let mut queue = PostQueue::load(&dir.path().join("queue.yaml")).unwrap();
        queue.append(QueuedPost::new_post("a", "one", at(1)));
        queue.append(QueuedPost::new_post("b", "two", at(2)));
        queue.append(QueuedPost::new_post("a", "one", at(3)));
        queue.deduplicate();

        let ids: Vec<_> = queue.iter().map(|p| (p.id.as_str(), p.published_at)).collect();
        assert_eq!(ids, vec![("a", at(1)), ("b", at(2))]);
    }

    #[test]
    fn test_sort_is_stable() {
        let dir = tempdir().unwrap();
        let mut queue = PostQueue::load(&dir.path().join("queue.yaml")).unwrap();
        let mut part1 = QueuedPost::new_post("t", "1/2", at(5));
        part1.group_id = Some("g".to_string());
        let mut part2 = QueuedPost::new_post("t", "2/2", at(5));
        part2.group_id = Some("g".to_string());
        queue.append(part1);
        queue.append(part2);
        queue.append(QueuedPost::new_post("old", "old", at(1)));
        queue.sort();

        let texts: Vec<_> = queue.iter().map(|p| p.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["old", "1/2", "2/2"]);
    }
}
