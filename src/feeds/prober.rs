use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::FeedProber;

/// Upper bound on candidates probed per page
const MAX_CANDIDATES: usize = 10;

static ALTERNATE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel][href]").expect("Invalid link selector"));

static ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Invalid anchor selector"));

pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("mastofeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetches and parses a feed.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<feed_rs::model::Feed> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch feed {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Feed fetch for {} failed with status {}", url, response.status());
    }

    let body = response.bytes().await.context("Failed to read feed body")?;
    feed_rs::parser::parse(&body[..]).with_context(|| format!("Failed to parse feed {}", url))
}

/// Extracts candidate feed URLs from a page, resolved against `base`, the
/// final URL of the page. Relative hrefs follow browser rules, so
/// `feed.xml` on `/blog/post` resolves to `/blog/feed.xml`.
///
/// Order: `<link rel="alternate">` whose type mentions rss, then the other
/// alternate links mentioning xml, then anchors whose href looks like a feed.
/// Duplicates keep their first position.
pub fn extract_candidates(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);

    let mut rss_links = Vec::new();
    let mut other_links = Vec::new();
    for element in document.select(&ALTERNATE_LINK) {
        let value = element.value();
        let is_alternate = value
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")));
        if !is_alternate {
            continue;
        }
        let Some(kind) = value.attr("type").map(str::to_ascii_lowercase) else {
            continue;
        };
        let Some(href) = value.attr("href") else {
            continue;
        };
        if kind.contains("rss") {
            rss_links.push(href);
        } else if kind.contains("xml") {
            other_links.push(href);
        }
    }

    let anchors = document.select(&ANCHOR).filter_map(|element| {
        let href = element.value().attr("href")?;
        let lower = href.to_ascii_lowercase();
        ["rss", "xml", "atom", "feed"]
            .iter()
            .any(|hint| lower.contains(hint))
            .then_some(href)
    });

    let mut candidates: Vec<String> = Vec::new();
    for href in rss_links.into_iter().chain(other_links).chain(anchors) {
        let Ok(resolved) = base.join(href.trim()) else {
            debug!("Skipping unresolvable feed href: {}", href);
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let resolved = resolved.to_string();
        if !candidates.contains(&resolved) {
            candidates.push(resolved);
        }
        if candidates.len() >= MAX_CANDIDATES {
            break;
        }
    }

    candidates
}

/// Probes over HTTP. No retries: any failure reads as "not a feed".
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedProber for HttpProber {
    async fn is_already_feed(&self, url: &str) -> bool {
        match fetch_feed(&self.client, url).await {
            Ok(feed) => !feed.entries.is_empty(),
            Err(e) => {
                debug!("{} is not a feed: {:#}", url, e);
                false
            }
        }
    }

    async fn discover_feeds(&self, url: &str) -> Vec<String> {
        let response = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Feed discovery for {} got status {}", url, response.status());
                return Vec::new();
            }
            Err(e) => {
                warn!("Feed discovery for {} failed: {}", url, e);
                return Vec::new();
            }
        };

        // Relative hrefs resolve against the page after redirects
        let base = response.url().clone();
        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to read page {}: {}", url, e);
                return Vec::new();
            }
        };

        let mut feeds = Vec::new();
        for candidate in extract_candidates(&html, &base) {
            if self.is_already_feed(&candidate).await {
                feeds.push(candidate);
            }
        }

        debug!("Discovered {} feed(s) at {}", feeds.len(), url);
        feeds
    }
}
