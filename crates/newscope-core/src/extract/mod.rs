//! Readable-text extraction from article pages.
//!
//! The pipeline depends on the [`ArticleExtractor`] capability; the
//! shipped implementation fetches the page and runs readability over it.

pub mod host_limiter;
pub mod worker;

use crate::error::ExtractError;
use std::io::Cursor;
use std::time::Duration;
use url::Url;

/// Readable content extracted from an article page.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    /// Plain text of the main article body.
    pub text: String,
    /// Cleaned-up HTML of the main article body.
    pub rich_html: String,
}

/// Capability to turn an article URL into readable content.
#[async_trait::async_trait]
pub trait ArticleExtractor: Send + Sync {
    /// Fetch the article page and extract its readable content.
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError>;
}

/// Extractor backed by a readability pass over the fetched page.
pub struct ReadabilityExtractor {
    client: reqwest::Client,
    fallback_url: Option<String>,
    include_images: bool,
    include_links: bool,
}

impl ReadabilityExtractor {
    /// Build an extractor.
    ///
    /// When `fallback_url` is non-empty it is prepended to every article
    /// URL (mirror services expect the original URL as a path suffix).
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        fallback_url: &str,
        include_images: bool,
        include_links: bool,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            fallback_url: (!fallback_url.is_empty()).then(|| fallback_url.to_string()),
            include_images,
            include_links,
        })
    }
}

#[async_trait::async_trait]
impl ArticleExtractor for ReadabilityExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError> {
        let target = match &self.fallback_url {
            Some(prefix) => format!("{prefix}{url}"),
            None => url.to_string(),
        };

        let response = self.client.get(&target).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Status {
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        // Relative links in the page resolve against the original URL.
        let base = Url::parse(url)?;
        let product = readability::extractor::extract(&mut Cursor::new(bytes), &base)
            .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

        let mut rich_html = product.content;
        if !self.include_images {
            rich_html = strip_element_tags(&rich_html, "img");
        }
        if !self.include_links {
            rich_html = strip_element_tags(&rich_html, "a");
        }

        Ok(ExtractedArticle {
            text: product.text,
            rich_html,
        })
    }
}

/// Remove every `<name ...>` and `</name>` tag, keeping inner content.
fn strip_element_tags(html: &str, name: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('>') {
            Some(end) => {
                let inner = &tail[1..end];
                let tag = inner.strip_prefix('/').unwrap_or(inner);
                let tag_name: String = tag
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                if !tag_name.eq_ignore_ascii_case(name) {
                    out.push_str(&tail[..=end]);
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
