//! Error types for the Newscope core library.
//!
//! Each concern has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// YAML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying YAML parse error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to the SQLite database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// The single-writer engine reported busy/locked; safe to retry.
    #[error("database is contended (busy or locked)")]
    Contended,

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },
}

impl StorageError {
    /// Map an SQLx error, detecting SQLITE_BUSY / SQLITE_LOCKED conditions
    /// so callers can retry them through the uniform retry wrapper.
    pub fn from_sqlx(source: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &source {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            let message = db.message().to_lowercase();
            if code == "5"
                || code == "6"
                || message.contains("database is locked")
                || message.contains("database table is locked")
            {
                return StorageError::Contended;
            }
        }
        StorageError::Query { source }
    }

    /// Whether this error is a transient contention condition.
    pub fn is_contended(&self) -> bool {
        matches!(self, StorageError::Contended)
    }
}

/// Errors from interacting with the LLM endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM response could not be parsed.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// Classification failed after all retries.
    #[error("classification failed: {0}")]
    GenerationFailed(String),
}

impl LlmError {
    /// Whether the transport loop should retry this error.
    ///
    /// Covers network failures, 5xx/429 responses, and unparseable output;
    /// a definitive 4xx (bad key, bad model) surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(_) | LlmError::RateLimited { .. } | LlmError::Parse(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::GenerationFailed(_) => false,
        }
    }
}

/// Errors from fetching and parsing a feed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level failure fetching the feed.
    #[error("feed fetch failed: {source}")]
    Http {
        /// The underlying HTTP client error.
        #[from]
        source: reqwest::Error,
    },

    /// The feed server returned a non-success status.
    #[error("feed fetch returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The response body is not a parseable RSS/Atom document.
    #[error("feed parse failed: {0}")]
    Parse(String),
}

/// Errors from extracting readable article content.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Network-level failure fetching the article page.
    #[error("article fetch failed: {source}")]
    Http {
        /// The underlying HTTP client error.
        #[from]
        source: reqwest::Error,
    },

    /// The article server returned a non-success status.
    #[error("article fetch returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The article URL is not a valid URL.
    #[error("invalid article URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Readable content could not be extracted from the page.
    #[error("content extraction failed: {0}")]
    Unreadable(String),

    /// Extraction produced less text than the configured minimum.
    #[error("content too short ({length} chars, minimum {min})")]
    TooShort {
        /// Extracted plain-text length in characters.
        length: usize,
        /// Configured minimum length.
        min: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "llm.endpoint".to_string(),
        };
        assert_eq!(err.to_string(), "missing required config field: llm.endpoint");
    }

    #[test]
    fn config_error_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            field: "llm.temperature".to_string(),
            message: "must be between 0 and 2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for config field 'llm.temperature': must be between 0 and 2"
        );
    }

    #[test]
    fn storage_error_contended_message() {
        assert_eq!(
            StorageError::Contended.to_string(),
            "database is contended (busy or locked)"
        );
        assert!(StorageError::Contended.is_contended());
    }

    #[test]
    fn llm_error_rate_limited_is_transient() {
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "LLM rate limited, retry after 30 seconds");
        assert!(err.is_transient());
    }

    #[test]
    fn llm_error_server_errors_are_transient() {
        assert!(LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }
        .is_transient());
        assert!(!LlmError::Api {
            status: 401,
            message: "bad key".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn llm_error_generation_failed_is_terminal() {
        let err = LlmError::GenerationFailed("no usable output".to_string());
        assert_eq!(err.to_string(), "classification failed: no usable output");
        assert!(!err.is_transient());
    }

    #[test]
    fn fetch_error_status_message() {
        let err = FetchError::Status { status: 404 };
        assert_eq!(err.to_string(), "feed fetch returned HTTP 404");
    }

    #[test]
    fn extract_error_too_short_message() {
        let err = ExtractError::TooShort {
            length: 42,
            min: 200,
        };
        assert_eq!(err.to_string(), "content too short (42 chars, minimum 200)");
    }
}
