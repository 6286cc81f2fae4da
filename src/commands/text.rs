//! Text helpers for mention content: markup stripping, self-handle removal,
//! quoted-name extraction and slugs.

use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("Invalid line break regex"));

static REPEATED_BLANKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("Invalid blanks regex"));

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“”]([^"“”]+)["“”]"#).expect("Invalid quoted regex"));

/// Converts post HTML into plain text. Paragraphs and `<br>` become line
/// breaks, entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    let fragment = Html::parse_fragment(&with_breaks);
    fragment.root_element().text().collect::<String>()
}

/// Collapses runs of spaces/tabs into one space and trims.
pub fn collapse_blanks(text: &str) -> String {
    REPEATED_BLANKS.replace_all(text, " ").trim().to_string()
}

/// Handle without the leading `@`: `user@domain` or `user`.
pub fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

/// The `user` part of a handle.
pub fn short_handle(handle: &str) -> &str {
    let normalized = normalize_handle(handle);
    normalized.split('@').next().unwrap_or(normalized)
}

fn is_handle_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

/// Byte ranges where `needle` occurs as a whole handle (not as a prefix of a
/// longer one such as `@feederbot`).
fn handle_occurrences(text: &str, needle: &str) -> Vec<(usize, usize)> {
    text.match_indices(needle)
        .map(|(start, m)| (start, start + m.len()))
        .filter(|&(start, end)| {
            let before_ok = text[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !is_handle_char(c));
            let after_ok = text[end..]
                .chars()
                .next()
                .map_or(true, |c| !is_handle_char(c));
            before_ok && after_ok
        })
        .collect()
}

/// Removes the bot's own handle from the text, trying `@user@domain` first
/// and then `@user`.
///
/// Returns the character offset of the first occurrence (`None` when the
/// handle is absent) and the cleaned text.
pub fn remove_self_handle(text: &str, me: &str) -> (Option<usize>, String) {
    let long = format!("@{}", normalize_handle(me));
    let short = format!("@{}", short_handle(me));

    for needle in [&long, &short] {
        let ranges = handle_occurrences(text, needle);
        let Some(&(first, _)) = ranges.first() else {
            continue;
        };

        let position = text[..first].chars().count();
        let mut cleaned = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end) in ranges {
            cleaned.push_str(&text[cursor..start]);
            cursor = end;
        }
        cleaned.push_str(&text[cursor..]);

        return (Some(position), collapse_blanks(&cleaned));
    }

    (None, collapse_blanks(text))
}

/// Finds the first quoted phrase. Returns the phrase and the text without it.
pub fn extract_quoted_name(text: &str) -> (Option<String>, String) {
    let Some(captures) = QUOTED.captures(text) else {
        return (None, text.to_string());
    };
    let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
        return (None, text.to_string());
    };

    let name = inner.as_str().trim();
    let remaining = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
    let name = (!name.is_empty()).then(|| name.to_string());
    (name, collapse_blanks(&remaining))
}

/// Lowercase ASCII letters, digits and single hyphens. Non-ASCII text is
/// transliterated first ("Àlex" gives "alex"). Apostrophes vanish, every
/// other run of characters becomes one hyphen.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;

    for c in ascii.chars() {
        if c == '\'' || c == '’' {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// An alias is valid when it is already its own slug.
pub fn is_valid_slug(alias: &str) -> bool {
    !alias.is_empty() && slugify(alias) == alias
}

/// Syntactic check: the URL parses and has both a scheme and a host.
pub fn is_valid_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}
