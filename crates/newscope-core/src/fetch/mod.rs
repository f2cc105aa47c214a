//! Feed fetching with conditional-GET support.
//!
//! Stores nothing itself: the processor persists the returned validators
//! on the feed row and hands them back on the next poll.

pub mod parser;
pub mod processor;

use crate::error::FetchError;
use std::time::Duration;

/// Outcome of fetching a feed URL.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The server answered 304; the stored items are current.
    NotModified,
    /// Fresh feed bytes plus the response validators for the next poll.
    Fetched {
        /// Raw response body.
        bytes: Vec<u8>,
        /// ETag header of the response, if present.
        etag: Option<String>,
        /// Last-Modified header of the response, if present.
        last_modified: Option<String>,
    },
}

/// HTTP client for feed documents.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    /// Build a fetcher with a bounded per-request timeout.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// GET the feed URL, honoring stored ETag / Last-Modified validators.
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        let header_string = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let etag = header_string(reqwest::header::ETAG);
        let last_modified = header_string(reqwest::header::LAST_MODIFIED);

        let bytes = response.bytes().await?.to_vec();

        Ok(FetchOutcome::Fetched {
            bytes,
            etag,
            last_modified,
        })
    }
}
