//! Readable-text extraction from fetched HTML.
//!
//! Walks the DOM of the main content area (`article`, `main`,
//! `[role=main]`, then `body`), drops text under boilerplate elements, and
//! keeps block boundaries as blank-line paragraph breaks so that later
//! passage chunking can split on them.

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, SearchError};
use crate::types::PageContent;

/// Elements whose text is never part of the readable content.
const BOILERPLATE: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe", "form",
    "button", "template",
];

/// Elements that start a new paragraph.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "pre", "tr", "table", "br", "figcaption", "dd", "dt",
];

const CONTENT_ROOTS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

/// Metadata selectors carrying a publication timestamp, in priority order.
const DATE_SELECTORS: &[(&str, &str)] = &[
    ("meta[property=\"article:published_time\"]", "content"),
    ("meta[itemprop=\"datePublished\"]", "content"),
    ("meta[name=\"date\"]", "content"),
    ("meta[name=\"pubdate\"]", "content"),
    ("time[datetime]", "datetime"),
];

/// Extract readable content, keeping at most `max_chars` characters of text.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] if the page has no readable text.
pub fn extract_content(html: &str, url: &str, max_chars: usize) -> Result<PageContent> {
    let document = Html::parse_document(html);

    let text = CONTENT_ROOTS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .filter_map(|sel| document.select(&sel).next())
        .map(readable_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(SearchError::Parse(format!("no readable text at {url}")));
    }

    let text = truncate_chars(&text, max_chars);
    let word_count = text.split_whitespace().count();

    Ok(PageContent {
        url: url.to_owned(),
        title: extract_title(&document),
        text,
        word_count,
        published_at: extract_published_at(&document),
    })
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|el| collapse_spaces(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Collect text under `root`, paragraph-separated, skipping boilerplate.
fn readable_text(root: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in root.descendants() {
        let value = node.value();
        if let Some(element) = value.as_element() {
            if BLOCKS.contains(&element.name()) {
                raw.push('\n');
            }
            continue;
        }
        let Some(text) = value.as_text() else {
            continue;
        };
        let skipped = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(|a| a.value().as_element())
            .any(|e| BOILERPLATE.contains(&e.name()));
        if !skipped {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(collapse_spaces)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_owned(),
        None => text.to_owned(),
    }
}

fn extract_published_at(document: &Html) -> Option<DateTime<Utc>> {
    DATE_SELECTORS.iter().find_map(|(selector, attr)| {
        let sel = Selector::parse(selector).ok()?;
        document
            .select(&sel)
            .filter_map(|el| el.value().attr(attr))
            .find_map(parse_timestamp)
    })
}

/// Parse RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
