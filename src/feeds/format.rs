//! Turns a feed entry into status text: markup cleaning, media extraction,
//! length budgeting and the title/summary templates.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::commands::text::html_to_text;
use crate::config::FeedParserConfig;
use crate::platform::MediaAttachment;

const ELLIPSIS: &str = "...";
const SEPARATOR: &str = "\n\n";

static IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("Invalid image selector"));

/// Formatting knobs taken from `[feed_parser]`
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub max_summary_length: usize,
    pub show_name: bool,
    pub merge_content: bool,
    pub max_media: usize,
}

impl From<&FeedParserConfig> for FormatOptions {
    fn from(config: &FeedParserConfig) -> Self {
        Self {
            max_summary_length: config.max_summary_length,
            show_name: config.show_name,
            merge_content: config.merge_content,
            max_media: config.max_media_per_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPost {
    pub text: String,
    /// Spoiler text; `None` when the title was merged into the text
    pub summary: Option<String>,
}

/// Strips markup and collapses every whitespace run (newlines included)
/// into a single space.
pub fn clean_text(html: &str) -> String {
    html_to_text(html)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `<img>` elements with their alt text, in document order.
pub fn extract_media(html: &str, max: usize) -> Vec<MediaAttachment> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&IMAGE)
        .filter_map(|img| {
            let url = img.value().attr("src")?.trim();
            if url.is_empty() {
                return None;
            }
            let alt_text = img
                .value()
                .attr("alt")
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .map(str::to_string);
            Some(MediaAttachment {
                url: url.to_string(),
                alt_text,
            })
        })
        .take(max)
        .collect()
}

/// Cuts `text` to at most `max` characters, ending with `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max < ELLIPSIS.len() {
        return String::new();
    }
    let kept: String = text.chars().take(max - ELLIPSIS.len()).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

/// Builds the status for one entry.
///
/// The text is `{body}\n\n{link}`, or `{title}\n\n{body}\n\n{link}` when
/// merging content; only the body is shortened to fit the length budget.
pub fn format_post(
    options: &FormatOptions,
    origin: &str,
    title: &str,
    body_html: &str,
    link: &str,
) -> FormattedPost {
    let title = clean_text(title);
    let body = clean_text(body_html);

    let mut fixed = link.chars().count() + SEPARATOR.len();
    if options.merge_content && !title.is_empty() {
        fixed += title.chars().count() + SEPARATOR.len();
    }
    let body = truncate(&body, options.max_summary_length.saturating_sub(fixed));

    let summary = if options.show_name {
        format!("{}: {}", origin, title)
    } else {
        title.clone()
    };

    let mut parts = Vec::with_capacity(3);
    if options.merge_content {
        parts.push(title.as_str());
    }
    parts.push(body.as_str());
    parts.push(link);
    let text = parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    FormattedPost {
        text,
        summary: (!options.merge_content && !summary.is_empty()).then_some(summary),
    }
}
