//! Filtered RSS 2.0 output.
//!
//! Serializes the classified corpus (optionally narrowed to one topic)
//! as an RSS document. Item GUIDs are synthetic: the item's opaque ID
//! bound to the installation's base URL, marked non-permalink.

use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use newscope_core::storage::views::{self, ClassifiedItem, ItemFilter, SortBy};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the RSS endpoints.
#[derive(Deserialize)]
pub struct RssQuery {
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    pub limit: Option<u32>,
}

fn default_min_score() -> f64 {
    5.0
}

/// GET /rss
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RssQuery>,
) -> Result<Response, ApiError> {
    render(state, None, query).await
}

/// GET /rss/{topic}
pub async fn feed_by_topic(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Query(query): Query<RssQuery>,
) -> Result<Response, ApiError> {
    render(state, Some(topic), query).await
}

async fn render(
    state: Arc<AppState>,
    topic: Option<String>,
    query: RssQuery,
) -> Result<Response, ApiError> {
    let channel_title = match &topic {
        Some(topic) => format!("Newscope: {topic}"),
        None => "Newscope".to_string(),
    };

    let filter = ItemFilter {
        min_score: query.min_score,
        topic,
        feed_name: None,
        sort_by: SortBy::Published,
        only_liked: false,
        limit: query.limit.unwrap_or(state.config.server.page_size),
        offset: 0,
    };
    let items = views::list_classified(&state.db, &filter).await?;

    let xml = render_rss(&state.config.server.base_url, &channel_title, &items)
        .map_err(|e| ApiError::Internal(format!("rss serialization failed: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

/// Serialize classified items into an RSS 2.0 document.
fn render_rss(
    base_url: &str,
    channel_title: &str,
    items: &[ClassifiedItem],
) -> std::io::Result<String> {
    let base = base_url.trim_end_matches('/');
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", channel_title)?;
    text_element(&mut writer, "link", base)?;
    text_element(&mut writer, "description", "Articles curated by Newscope")?;

    for item in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;

        text_element(&mut writer, "title", &item.title)?;
        if !item.link.is_empty() {
            text_element(&mut writer, "link", &item.link)?;
        }

        let description = match item.summary.as_deref() {
            Some(summary) if !summary.is_empty() => summary,
            _ => item.description.as_str(),
        };
        text_element(&mut writer, "description", description)?;

        if let Some(pub_date) = item
            .published
            .as_deref()
            .and_then(|p| chrono::DateTime::parse_from_rfc3339(p).ok())
        {
            text_element(&mut writer, "pubDate", &pub_date.to_rfc2822())?;
        }

        for topic in item.topic_list() {
            text_element(&mut writer, "category", &topic)?;
        }

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&format!(
            "{base}/items/{}",
            item.id
        ))))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(id: i64, title: &str, summary: Option<&str>) -> ClassifiedItem {
        ClassifiedItem {
            id,
            feed_id: 1,
            feed_title: "Feed".to_string(),
            title: title.to_string(),
            link: format!("https://example.com/{id}"),
            description: "fallback description".to_string(),
            published: Some("2026-03-01T09:30:00Z".to_string()),
            relevance_score: 7.0,
            explanation: None,
            topics: Some(r#"["rust","ai"]"#.to_string()),
            summary: summary.map(str::to_string),
            classified_at: "2026-03-01T10:00:00Z".to_string(),
            user_feedback: "none".to_string(),
        }
    }

    #[test]
    fn renders_channel_and_items() {
        let items = vec![classified(3, "An article", Some("A crisp summary."))];
        let xml = render_rss("http://localhost:8080", "Newscope", &items).expect("render");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<rss version=\"2.0\">"));
        assert!(xml.contains("<title>An article</title>"));
        assert!(xml.contains("<description>A crisp summary.</description>"));
        assert!(xml.contains("<category>rust</category>"));
        assert!(xml.contains("<category>ai</category>"));
    }

    #[test]
    fn synthetic_guid_binds_item_id_to_base_url() {
        let items = vec![classified(42, "T", None)];
        let xml = render_rss("http://localhost:8080/", "Newscope", &items).expect("render");
        assert!(xml.contains(
            "<guid isPermaLink=\"false\">http://localhost:8080/items/42</guid>"
        ));
    }

    #[test]
    fn missing_summary_falls_back_to_description() {
        let items = vec![classified(1, "T", None)];
        let xml = render_rss("http://localhost:8080", "Newscope", &items).expect("render");
        assert!(xml.contains("<description>fallback description</description>"));
    }

    #[test]
    fn pub_date_is_rfc2822() {
        let items = vec![classified(1, "T", None)];
        let xml = render_rss("http://localhost:8080", "Newscope", &items).expect("render");
        assert!(xml.contains("<pubDate>Sun, 1 Mar 2026 09:30:00 +0000</pubDate>"));
    }

    #[test]
    fn xml_special_characters_are_escaped() {
        let items = vec![classified(1, "Ben & Jerry's <scoop>", None)];
        let xml = render_rss("http://localhost:8080", "Newscope", &items).expect("render");
        assert!(xml.contains("Ben &amp; Jerry's &lt;scoop&gt;"));
    }
}
