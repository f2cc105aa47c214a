//! Configuration management for Newscope.
//!
//! Configuration is a YAML file with `${VAR}` environment-variable
//! expansion applied to the raw text before parsing. Loading sequence:
//! 1. Determine the config file path (argument > `NEWSCOPE_CONFIG` env var > default)
//! 2. Expand environment variables and parse the YAML
//! 3. Validate, collecting every error instead of stopping at the first
//!
//! Interval, age, and timeout fields are integer seconds; the store retry
//! delays are integer milliseconds.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the Newscope daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Scheduler, cleanup, and store-retry settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// LLM endpoint and classification settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Article content extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1:8080".
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Public base URL used for synthetic GUIDs in RSS output.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default page size for item listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_server_timeout")]
    pub timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            timeout: default_server_timeout(),
        }
    }
}

/// SQLite database settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_dsn")]
    pub dsn: String,

    /// Maximum open connections in the pool.
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    /// Minimum idle connections kept in the pool.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,

    /// Connection lifetime in seconds.
    #[serde(default = "default_conn_max_lifetime")]
    pub conn_max_lifetime: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime: default_conn_max_lifetime(),
        }
    }
}

/// Scheduler, cleanup, and store-retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Maximum concurrent feed fetches.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Items older than this many seconds are eligible for cleanup.
    #[serde(default = "default_cleanup_age")]
    pub cleanup_age: u64,

    /// Items scoring below this survive cleanup only with user feedback.
    #[serde(default = "default_cleanup_min_score")]
    pub cleanup_min_score: f64,

    /// Seconds between retention passes.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Action-log entries older than this many seconds are pruned.
    #[serde(default = "default_feedback_retention")]
    pub feedback_retention: u64,

    /// Attempts for contended store writes.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial store-retry delay in milliseconds.
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay: u64,

    /// Maximum store-retry delay in milliseconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: u64,

    /// Retry jitter fraction in [0, 1].
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            max_workers: default_max_workers(),
            cleanup_age: default_cleanup_age(),
            cleanup_min_score: default_cleanup_min_score(),
            cleanup_interval: default_cleanup_interval(),
            feedback_retention: default_feedback_retention(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay: default_retry_initial_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_jitter: default_retry_jitter(),
        }
    }
}

impl ScheduleConfig {
    /// Tick period of the fetch scheduler.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// Period of the retention loop.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    /// Retry policy for contended store writes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_delay),
            max_delay: Duration::from_millis(self.retry_max_delay),
            jitter: self.retry_jitter,
        }
    }
}

/// LLM endpoint and generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat-completions API. Required.
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token for the endpoint (may be empty for local models).
    #[serde(default)]
    pub api_key: String,

    /// Model name. Required.
    #[serde(default)]
    pub model: String,

    /// Sampling temperature in [0, 2].
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,

    /// Optional override of the embedded classification system prompt.
    #[serde(default)]
    pub system_prompt: String,

    /// Classification-stage settings.
    #[serde(default)]
    pub classification: ClassificationConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_llm_timeout(),
            system_prompt: String::new(),
            classification: ClassificationConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Per-request timeout for LLM calls.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Retry policy for the LLM transport loop: up to five attempts with
    /// exponential backoff, capped at 30 seconds.
    pub fn transport_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

/// Classification-stage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationConfig {
    /// Number of recent feedback examples included in prompts.
    #[serde(default = "default_feedback_examples")]
    pub feedback_examples: u32,

    /// Items per classification batch (>= 1).
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Request a JSON-object response instead of a bare array.
    #[serde(default)]
    pub use_json_mode: bool,

    /// Feedback events between preference-summary updates (>= 5).
    #[serde(default = "default_preference_summary_threshold")]
    pub preference_summary_threshold: u32,

    /// Attempts of the outer summary-validation loop.
    #[serde(default = "default_summary_retry_attempts")]
    pub summary_retry_attempts: u32,

    /// Extra forbidden summary prefixes, appended to the built-in list.
    #[serde(default)]
    pub forbidden_summary_prefixes: Vec<String>,

    /// Topics that should raise scores by 1-2 points.
    #[serde(default)]
    pub preferred_topics: Vec<String>,

    /// Topics that should lower scores by 1-2 points.
    #[serde(default)]
    pub avoided_topics: Vec<String>,

    /// Optional overrides of the embedded preference-summary prompts.
    #[serde(default)]
    pub prompts: PromptOverrides,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            feedback_examples: default_feedback_examples(),
            batch_size: default_batch_size(),
            use_json_mode: false,
            preference_summary_threshold: default_preference_summary_threshold(),
            summary_retry_attempts: default_summary_retry_attempts(),
            forbidden_summary_prefixes: Vec::new(),
            preferred_topics: Vec::new(),
            avoided_topics: Vec::new(),
            prompts: PromptOverrides::default(),
        }
    }
}

/// Optional overrides of the embedded preference-summary prompts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptOverrides {
    /// Prompt used when no summary exists yet.
    #[serde(default)]
    pub generate_summary: String,

    /// Prompt used to refine an existing summary.
    #[serde(default)]
    pub update_summary: String,
}

/// Article content extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Whether the extraction pool runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-article fetch+extract timeout in seconds (>= 1 when enabled).
    #[serde(default = "default_extraction_timeout")]
    pub timeout: u64,

    /// Maximum concurrent extractions.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Minimum seconds between requests to the same host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,

    /// User-Agent header for article requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional mirror prefix prepended to article URLs.
    #[serde(default)]
    pub fallback_url: String,

    /// Extractions yielding fewer plain-text characters are rejected.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: u32,

    /// Keep `<img>` tags in the extracted rich HTML.
    #[serde(default)]
    pub include_images: bool,

    /// Keep `<a>` tags in the extracted rich HTML.
    #[serde(default)]
    pub include_links: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_extraction_timeout(),
            max_concurrent: default_max_concurrent(),
            rate_limit: default_rate_limit(),
            user_agent: default_user_agent(),
            fallback_url: String::new(),
            min_text_length: default_min_text_length(),
            include_images: false,
            include_links: false,
        }
    }
}

impl ExtractionConfig {
    /// Per-article extraction timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Minimum gap between requests to the same host.
    pub fn host_gap(&self) -> Duration {
        Duration::from_secs(self.rate_limit)
    }
}

// --- Default value functions for serde ---

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_page_size() -> u32 {
    30
}
fn default_server_timeout() -> u64 {
    30
}
fn default_dsn() -> String {
    "~/.newscope/newscope.db".to_string()
}
fn default_max_open_conns() -> u32 {
    4
}
fn default_max_idle_conns() -> u32 {
    1
}
fn default_conn_max_lifetime() -> u64 {
    300
}
fn default_update_interval() -> u64 {
    60
}
fn default_max_workers() -> u32 {
    20
}
fn default_cleanup_age() -> u64 {
    604_800 // 7 days
}
fn default_cleanup_min_score() -> f64 {
    3.0
}
fn default_cleanup_interval() -> u64 {
    3600
}
fn default_feedback_retention() -> u64 {
    2_592_000 // 30 days
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_initial_delay() -> u64 {
    100
}
fn default_retry_max_delay() -> u64 {
    2000
}
fn default_retry_jitter() -> f64 {
    0.2
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_feedback_examples() -> u32 {
    10
}
fn default_batch_size() -> u32 {
    10
}
fn default_preference_summary_threshold() -> u32 {
    10
}
fn default_summary_retry_attempts() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_extraction_timeout() -> u64 {
    30
}
fn default_max_concurrent() -> u32 {
    5
}
fn default_rate_limit() -> u64 {
    2
}
fn default_user_agent() -> String {
    format!("newscope/{}", env!("CARGO_PKG_VERSION"))
}
fn default_min_text_length() -> u32 {
    200
}

impl Config {
    /// Load configuration from a YAML file with `${VAR}` expansion.
    ///
    /// A missing file at the default path falls back to built-in
    /// defaults; a missing file at an explicitly given path is an error.
    pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let expanded = expand_env_vars(&contents);
                serde_yaml::from_str::<Config>(&expanded)
                    .map_err(|e| ConfigError::ParseError { source: e })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Ok(Config::default())
            }
            Err(_) => Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }),
        }
    }

    /// Load configuration and validate it, returning all validation errors at once.
    pub fn load_and_validate(config_path: Option<&str>) -> Result<Config, Vec<ConfigError>> {
        let config = Config::load(config_path).map_err(|e| vec![e])?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning every error found (not just the first).
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.llm.endpoint.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "llm.endpoint".to_string(),
            });
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "llm.model".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            errors.push(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: "must be between 0 and 2".to_string(),
            });
        }
        if self.llm.classification.batch_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "llm.classification.batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.llm.classification.preference_summary_threshold < 5 {
            errors.push(ConfigError::InvalidValue {
                field: "llm.classification.preference_summary_threshold".to_string(),
                message: "must be at least 5".to_string(),
            });
        }
        if self.llm.classification.summary_retry_attempts == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "llm.classification.summary_retry_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.schedule.max_workers == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "schedule.max_workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.schedule.retry_jitter) {
            errors.push(ConfigError::InvalidValue {
                field: "schedule.retry_jitter".to_string(),
                message: "must be between 0 and 1".to_string(),
            });
        }
        if self.schedule.retry_attempts == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "schedule.retry_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.extraction.enabled && self.extraction.timeout == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "extraction.timeout".to_string(),
                message: "must be at least 1 second when extraction is enabled".to_string(),
            });
        }

        if self.server.page_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "server.page_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the config file path from arguments, env vars, or default.
    ///
    /// Returns `(path, explicit)` where `explicit` is true if the path was
    /// provided via argument or env var rather than the default location.
    fn resolve_config_path(config_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(path) = config_path {
            return (expand_tilde(path), true);
        }

        if let Ok(env_path) = env::var("NEWSCOPE_CONFIG") {
            return (expand_tilde(&env_path), true);
        }

        (expand_tilde("~/.newscope/config.yaml"), false)
    }
}

/// Expand `${VAR}` references against the process environment.
///
/// Unset variables expand to the empty string; a `${` without a closing
/// brace is passed through unchanged.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Ok(value) = env::var(name) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
