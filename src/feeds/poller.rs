//! Polling pipeline: fetch each registered feed, keep the new entries and
//! turn them into queued posts.

use chrono::{DateTime, Months, Utc};
use feed_rs::model::{Entry, Feed};
use tracing::{debug, info, warn};

use super::format::{extract_media, format_post, FormatOptions};
use super::keywords::KeywordsFilter;
use super::prober::fetch_feed;
use crate::config::Config;
use crate::storage::queue::{PostQueue, QueuedPost};
use crate::storage::registry::FeedRegistry;

/// One feed entry reduced to what the pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub id: String,
    pub title: String,
    /// Raw markup
    pub body: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub language: String,
}

/// Entry id used for seen-tracking: the link without its scheme, so the
/// http and https versions of an entry count as the same.
fn entry_id(link: &str, fallback: &str) -> String {
    if link.is_empty() {
        return fallback.to_string();
    }
    link.strip_prefix("https:")
        .or_else(|| link.strip_prefix("http:"))
        .unwrap_or(link)
        .to_string()
}

fn entry_draft(entry: &Entry, language: &str) -> Option<EntryDraft> {
    let body = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .filter(|s| !s.trim().is_empty())?;
    let published_at = entry.published.or(entry.updated)?;
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    Some(EntryDraft {
        id: entry_id(&link, &entry.id),
        title: entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_default(),
        body,
        link,
        published_at,
        language: language.to_string(),
    })
}

/// Maps the feed entries to drafts, dropping entries with no body or date.
pub fn feed_to_drafts(feed: &Feed, language_default: &str, language_overwrite: bool) -> Vec<EntryDraft> {
    let language = if language_overwrite {
        language_default
    } else {
        feed.language.as_deref().unwrap_or(language_default)
    };

    let drafts: Vec<EntryDraft> = feed
        .entries
        .iter()
        .filter_map(|entry| entry_draft(entry, language))
        .collect();
    if drafts.len() != feed.entries.len() {
        debug!(
            "Dropped {} entries without body or date",
            feed.entries.len() - drafts.len()
        );
    }
    drafts
}

pub struct FeedPoller<'a> {
    config: &'a Config,
    client: &'a reqwest::Client,
    filter: KeywordsFilter,
    format: FormatOptions,
}

impl<'a> FeedPoller<'a> {
    pub fn new(config: &'a Config, client: &'a reqwest::Client) -> Self {
        let filter = KeywordsFilter::for_profile(
            &config.keywords_filter.profiles,
            config.feed_parser.keywords_filter_profile.as_deref(),
        );
        Self {
            config,
            client,
            filter,
            format: FormatOptions::from(&config.feed_parser),
        }
    }

    /// Polls every registered feed in alias order and appends the new posts
    /// to the queue. Returns how many were appended.
    ///
    /// A source that cannot be fetched is logged and skipped. New entries are
    /// only marked seen in memory; the caller saves the registry once the
    /// queue holding them is on disk.
    pub async fn poll_all(&self, registry: &mut FeedRegistry, queue: &mut PostQueue) -> usize {
        let sources: Vec<(String, String)> = registry
            .all()
            .map(|(alias, record)| (alias.clone(), record.feed_url.clone()))
            .collect();

        let mut appended = 0;
        for (alias, feed_url) in sources {
            info!("Processing source {}", alias);
            let feed = match fetch_feed(self.client, &feed_url).await {
                Ok(feed) => feed,
                Err(e) => {
                    warn!("Skipping source {}: {:#}", alias, e);
                    continue;
                }
            };

            for post in self.process_feed(&alias, &feed, registry, Utc::now()) {
                queue.append(post);
                appended += 1;
            }
        }

        appended
    }

    /// Filters the entries of one fetched feed, marks the kept ones as seen
    /// in `registry` and formats them. Nothing is written to disk.
    pub fn process_feed(
        &self,
        alias: &str,
        feed: &Feed,
        registry: &mut FeedRegistry,
        now: DateTime<Utc>,
    ) -> Vec<QueuedPost> {
        let parser = &self.config.feed_parser;
        let drafts = feed_to_drafts(feed, &parser.language_default, parser.language_overwrite);
        let total = drafts.len();

        let cutoff = now.checked_sub_months(Months::new(parser.months_too_old));
        let seen: &FeedRegistry = registry;
        let kept: Vec<EntryDraft> = drafts
            .into_iter()
            .filter(|draft| self.is_wanted(alias, draft, seen, cutoff))
            .collect();
        info!("Source {}: {} new, {} discarded", alias, kept.len(), total - kept.len());

        let ids: Vec<String> = kept.iter().map(|d| d.id.clone()).collect();
        registry.mark_seen(alias, &ids);

        let origin = registry
            .get(alias)
            .and_then(|r| r.name.clone())
            .unwrap_or_else(|| alias.to_string());

        kept.into_iter()
            .map(|draft| self.to_post(&origin, draft))
            .collect()
    }

    fn is_wanted(
        &self,
        alias: &str,
        draft: &EntryDraft,
        registry: &FeedRegistry,
        cutoff: Option<DateTime<Utc>>,
    ) -> bool {
        if registry.is_seen(alias, &draft.id) {
            debug!("Discarding {}: already seen", draft.id);
            return false;
        }
        if cutoff.is_some_and(|cutoff| draft.published_at <= cutoff) {
            debug!("Discarding {}: too old ({})", draft.id, draft.published_at);
            return false;
        }
        if !self.filter.accepts(&format!("{} {}", draft.title, draft.body)) {
            debug!("Discarding {}: no keyword matched", draft.id);
            return false;
        }
        true
    }

    fn to_post(&self, origin: &str, draft: EntryDraft) -> QueuedPost {
        let formatted = format_post(&self.format, origin, &draft.title, &draft.body, &draft.link);
        let media = extract_media(
            &format!("{} {}", draft.title, draft.body),
            self.format.max_media,
        );

        let mut post = QueuedPost::new_post(draft.id, formatted.text, draft.published_at);
        post.summary = formatted.summary;
        post.language = Some(draft.language);
        post.media = media;
        post
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::storage::registry::FeedRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>News</title>
    <link>https://news.example.com</link>
    <description>Local news</description>
    <language>ca</language>
    <item>
      <title>Festa major a Talamanca</title>
      <link>https://news.example.com/festa</link>
      <description>&lt;p&gt;Programa de la festa &lt;img src="https://news.example.com/festa.png" alt="Cartell" /&gt;&lt;/p&gt;</description>
      <pubDate>Thu, 15 Feb 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Mercat setmanal</title>
      <link>http://news.example.com/mercat</link>
      <description>El mercat torna dissabte</description>
      <pubDate>Fri, 23 Feb 2024 08:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Sense data</title>
      <link>https://news.example.com/sense-data</link>
      <description>No date here</description>
    </item>
    <item>
      <title>Sense cos</title>
      <link>https://news.example.com/sense-cos</link>
      <pubDate>Fri, 23 Feb 2024 08:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Notícia antiga</title>
      <link>https://news.example.com/antiga</link>
      <description>Fa molt de temps</description>
      <pubDate>Sun, 01 Jan 2023 08:30:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn parse_feed() -> Feed {
        feed_rs::parser::parse(RSS.as_bytes()).unwrap()
    }

    fn registry() -> (FeedRegistry, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = FeedRegistry::load(&dir.path().join("feeds.yaml")).unwrap();
        registry.set(
            "news",
            FeedRecord::new(
                "https://news.example.com",
                "https://news.example.com/rss",
                Some("Notícies".to_string()),
            ),
        );
        (registry, dir)
    }

    #[test]
    fn test_entry_id_strips_scheme() {
        assert_eq!(entry_id("https://domain.com/a", "x"), "//domain.com/a");
        assert_eq!(entry_id("http://domain.com/a", "x"), "//domain.com/a");
        assert_eq!(entry_id("", "guid-1"), "guid-1");
    }

    #[test]
    fn test_feed_to_drafts() {
        let drafts = feed_to_drafts(&parse_feed(), "en", false);
        let ids: Vec<_> = drafts.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "//news.example.com/festa",
                "//news.example.com/mercat",
                "//news.example.com/antiga"
            ]
        );
        assert!(drafts.iter().all(|d| d.language == "ca"));
        assert_eq!(drafts[1].title, "Mercat setmanal");
        assert_eq!(
            drafts[1].published_at,
            Utc.with_ymd_and_hms(2024, 2, 23, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_feed_to_drafts_language() {
        let feed = parse_feed();
        assert!(feed_to_drafts(&feed, "en", true)
            .iter()
            .all(|d| d.language == "en"));

        let mut without_language = parse_feed();
        without_language.language = None;
        assert!(feed_to_drafts(&without_language, "es", false)
            .iter()
            .all(|d| d.language == "es"));
    }

    #[test]
    fn test_process_feed_formats_and_marks_seen() {
        let config = sample_config();
        let client = reqwest::Client::new();
        let poller = FeedPoller::new(&config, &client);
        let (mut registry, dir) = registry();

        let posts = poller
            .process_feed("news", &parse_feed(), &mut registry, now());
        assert_eq!(posts.len(), 2);

        let festa = &posts[0];
        assert_eq!(festa.id, "//news.example.com/festa");
        assert_eq!(
            festa.text.as_deref(),
            Some("Festa major a Talamanca\n\nPrograma de la festa\n\nhttps://news.example.com/festa")
        );
        assert_eq!(festa.summary, None);
        assert_eq!(festa.language.as_deref(), Some("ca"));
        assert_eq!(festa.media.len(), 1);
        assert_eq!(festa.media[0].url, "https://news.example.com/festa.png");
        assert_eq!(festa.media[0].alt_text.as_deref(), Some("Cartell"));

        assert!(registry.is_seen("news", "//news.example.com/festa"));
        assert!(registry.is_seen("news", "//news.example.com/mercat"));
        assert!(!registry.is_seen("news", "//news.example.com/antiga"));

        // Seen ids stay in memory until the caller saves the registry
        let stored = FeedRegistry::load(&dir.path().join("feeds.yaml")).unwrap();
        assert!(!stored.is_seen("news", "//news.example.com/festa"));

        let again = poller
            .process_feed("news", &parse_feed(), &mut registry, now());
        assert!(again.is_empty());
    }

    #[test]
    fn test_process_feed_keywords_profile() {
        let mut config = sample_config();
        config
            .keywords_filter
            .profiles
            .insert("talamanca".to_string(), vec!["TALAMANCA".to_string()]);
        config.feed_parser.keywords_filter_profile = Some("talamanca".to_string());
        config.feed_parser.merge_content = false;
        config.feed_parser.show_name = true;

        let client = reqwest::Client::new();
        let poller = FeedPoller::new(&config, &client);
        let (mut registry, _dir) = registry();

        let posts = poller
            .process_feed("news", &parse_feed(), &mut registry, now());
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].summary.as_deref(),
            Some("Notícies: Festa major a Talamanca")
        );
        assert!(!registry.is_seen("news", "//news.example.com/mercat"));
    }

    #[tokio::test]
    async fn test_poll_all_appends_to_queue() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let recent = RSS
            .replace("Thu, 15 Feb 2024", &Utc::now().format("%a, %d %b %Y").to_string())
            .replace("Fri, 23 Feb 2024", &Utc::now().format("%a, %d %b %Y").to_string());
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(recent))
            .mount(&server)
            .await;

        let config = sample_config();
        let client = reqwest::Client::new();
        let poller = FeedPoller::new(&config, &client);
        let (mut registry, dir) = registry();
        registry.set(
            "news",
            FeedRecord::new(server.uri(), format!("{}/rss", server.uri()), None),
        );
        let mut queue = PostQueue::load(&dir.path().join("queue.yaml")).unwrap();

        let appended = poller.poll_all(&mut registry, &mut queue).await;
        assert_eq!(appended, 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_all_skips_broken_source() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let today = Utc::now().format("%a, %d %b %Y").to_string();
        let recent = RSS
            .replace("Thu, 15 Feb 2024", &today)
            .replace("Fri, 23 Feb 2024", &today);
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(recent))
            .mount(&server)
            .await;

        let config = sample_config();
        let client = reqwest::Client::new();
        let poller = FeedPoller::new(&config, &client);
        let (mut registry, dir) = registry();
        // "broken" sorts first, so the good source comes after the failure
        registry.set(
            "broken",
            FeedRecord::new(server.uri(), format!("{}/broken", server.uri()), None),
        );
        registry.set(
            "news",
            FeedRecord::new(server.uri(), format!("{}/rss", server.uri()), None),
        );
        let mut queue = PostQueue::load(&dir.path().join("queue.yaml")).unwrap();

        let appended = poller.poll_all(&mut registry, &mut queue).await;
        assert_eq!(appended, 2);
        assert_eq!(queue.len(), 2);
        assert!(registry.is_seen("news", "//news.example.com/festa"));
        assert!(registry.get("broken").unwrap().urls_seen.is_empty());
    }
}
