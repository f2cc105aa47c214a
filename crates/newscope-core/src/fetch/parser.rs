//! Feed document parsing and normalization.
//!
//! Wraps feed-rs and maps its entry model onto prospective items. Feeds
//! without stable entry IDs get a derived GUID so the `(feed, guid)`
//! dedup key always exists.

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use sha2::{Digest, Sha256};

/// A normalized feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// Feed title, if the document carries one.
    pub title: Option<String>,
    /// Feed description, if the document carries one.
    pub description: Option<String>,
    /// Entries in document order.
    pub items: Vec<ParsedItem>,
}

/// One normalized feed entry.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    /// Publisher-provided GUID, or a stable derived hash.
    pub guid: String,
    /// Entry title.
    pub title: String,
    /// Entry link.
    pub link: String,
    /// Entry summary/description.
    pub description: String,
    /// Full entry content, when the feed carries one.
    pub content: String,
    /// First author name.
    pub author: String,
    /// Publication timestamp.
    pub published: Option<DateTime<Utc>>,
}

/// Parse raw feed bytes into a normalized document.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let title = feed.title.map(|t| t.content);
    let description = feed.description.map(|d| d.content);

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let published = entry.published.or(entry.updated);
            let description = entry.summary.map(|s| s.content).unwrap_or_default();
            let content = entry
                .content
                .and_then(|c| c.body)
                .unwrap_or_default();
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let author = entry
                .authors
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_default();

            let existing_id = if entry.id.trim().is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = derive_guid(existing_id, &link, &title, published);

            ParsedItem {
                guid,
                title,
                link,
                description,
                content,
                author,
                published,
            }
        })
        .collect();

    Ok(ParsedFeed {
        title,
        description,
        items,
    })
}

/// Use the publisher GUID when present; otherwise hash (link, title,
/// published) into a stable synthetic one.
fn derive_guid(
    existing: Option<&str>,
    link: &str,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link,
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{hash:x}")
}
