//! LLM classification of items.
//!
//! The pipeline depends on the [`Classifier`] capability set (classify a
//! batch, generate a preference summary, update one); [`LlmClassifier`]
//! implements it on top of an [`LlmProvider`], wrapping the transport in
//! the shared retry policy and running the semantic validation loop over
//! the model output.

pub mod parse;
pub mod prompt;
pub mod summaries;
pub mod worker;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::{ChatOptions, LlmProvider};
use crate::retry::{retry, RetryPolicy};
use crate::storage::items::Feedback;
use crate::storage::views::FeedbackExample;
use self::parse::{clamp_score, parse_classifications};
use self::summaries::{find_forbidden_prefix, forbidden_prefixes, strip_forbidden_prefix};
use std::collections::HashSet;
use std::sync::Arc;

/// One item rendered into a classification batch.
#[derive(Debug, Clone)]
pub struct ClassifyItem {
    /// Batch-assigned guid the model must echo back.
    pub guid: String,
    /// Article title.
    pub title: String,
    /// Article description.
    pub description: String,
    /// Article content (extracted text when available).
    pub content: String,
}

/// Context shared by every item in a batch prompt.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    /// The stored preference summary, verbatim (empty when disabled).
    pub preference_summary: String,
    /// Distinct topics already in use across the corpus.
    pub canonical_topics: Vec<String>,
    /// Topics that should raise scores.
    pub preferred_topics: Vec<String>,
    /// Topics that should lower scores.
    pub avoided_topics: Vec<String>,
    /// Recent feedback examples, newest first.
    pub examples: Vec<FeedbackExample>,
}

/// A validated, normalized classification for one batch item.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The batch guid this classification refers to.
    pub guid: String,
    /// Relevance score, clamped into [0, 10].
    pub score: f64,
    /// Short explanation of the score.
    pub explanation: String,
    /// Topic tags (possibly empty).
    pub topics: Vec<String>,
    /// Article summary, clean of forbidden prefixes.
    pub summary: String,
}

/// Capability set the classification and preference stages depend on.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a batch of items against the given context.
    async fn classify(
        &self,
        items: &[ClassifyItem],
        ctx: &ClassificationContext,
    ) -> Result<Vec<Classification>, LlmError>;

    /// Create a preference summary from feedback examples.
    async fn generate_summary(&self, examples: &[FeedbackExample]) -> Result<String, LlmError>;

    /// Refine an existing preference summary with new feedback examples.
    async fn update_summary(
        &self,
        current: &str,
        examples: &[FeedbackExample],
    ) -> Result<String, LlmError>;
}

/// [`Classifier`] implementation backed by a chat-completions provider.
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
    options: ChatOptions,
    system_prompt: String,
    summary_retry_attempts: u32,
    prefixes: Vec<String>,
    transport_retry: RetryPolicy,
    generate_prompt: String,
    update_prompt: String,
}

impl LlmClassifier {
    /// Build a classifier from the LLM configuration.
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        let classification = &config.classification;
        let system_prompt = if config.system_prompt.is_empty() {
            prompt::DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            config.system_prompt.clone()
        };
        let generate_prompt = if classification.prompts.generate_summary.is_empty() {
            prompt::DEFAULT_GENERATE_SUMMARY_PROMPT.to_string()
        } else {
            classification.prompts.generate_summary.clone()
        };
        let update_prompt = if classification.prompts.update_summary.is_empty() {
            prompt::DEFAULT_UPDATE_SUMMARY_PROMPT.to_string()
        } else {
            classification.prompts.update_summary.clone()
        };

        Self {
            provider,
            options: ChatOptions {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                json_mode: classification.use_json_mode,
            },
            system_prompt,
            summary_retry_attempts: classification.summary_retry_attempts.max(1),
            prefixes: forbidden_prefixes(&classification.forbidden_summary_prefixes),
            transport_retry: config.transport_retry_policy(),
            generate_prompt,
            update_prompt,
        }
    }

    async fn complete_text(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let options = ChatOptions {
            json_mode: false,
            ..self.options.clone()
        };
        let response = retry(&self.transport_retry, LlmError::is_transient, || {
            self.provider.complete(system, user, &options)
        })
        .await?;
        Ok(response.text.trim().to_string())
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        items: &[ClassifyItem],
        ctx: &ClassificationContext,
    ) -> Result<Vec<Classification>, LlmError> {
        let known: HashSet<&str> = items.iter().map(|i| i.guid.as_str()).collect();
        let attempts = self.summary_retry_attempts;
        let mut attempt = 1u32;

        loop {
            let user = prompt::build_user_prompt(ctx, items, self.options.json_mode, attempt > 1);

            // Inner transport loop: any request, response, or parse
            // failure retries with backoff.
            let parsed = retry(&self.transport_retry, LlmError::is_transient, || async {
                let response = self
                    .provider
                    .complete(&self.system_prompt, &user, &self.options)
                    .await?;
                parse_classifications(&response.text)
            })
            .await?;

            let mut seen = HashSet::new();
            let mut normalized: Vec<Classification> = Vec::new();
            for raw in parsed {
                if !known.contains(raw.guid.as_str()) {
                    tracing::warn!(guid = %raw.guid, "Dropping classification for unknown guid");
                    continue;
                }
                if !seen.insert(raw.guid.clone()) {
                    continue;
                }
                normalized.push(Classification {
                    guid: raw.guid,
                    score: clamp_score(raw.score),
                    explanation: raw.explanation.trim().to_string(),
                    topics: raw.topics,
                    summary: raw.summary.trim().to_string(),
                });
            }

            if normalized.is_empty() {
                if attempt >= attempts {
                    return Err(LlmError::GenerationFailed(
                        "no classifications matched the batch".to_string(),
                    ));
                }
                attempt += 1;
                continue;
            }

            let offending: Vec<usize> = normalized
                .iter()
                .enumerate()
                .filter(|(_, c)| find_forbidden_prefix(&c.summary, &self.prefixes).is_some())
                .map(|(i, _)| i)
                .collect();

            if offending.is_empty() {
                return Ok(normalized);
            }

            if attempt >= attempts {
                // Final attempt: clean the summaries rather than reject.
                for index in offending {
                    let classification = &mut normalized[index];
                    if let Some(prefix) =
                        find_forbidden_prefix(&classification.summary, &self.prefixes)
                    {
                        classification.summary =
                            strip_forbidden_prefix(&classification.summary, prefix);
                    }
                }
                return Ok(normalized);
            }

            tracing::warn!(
                attempt,
                offending = offending.len(),
                "Summaries used forbidden prefixes, retrying batch"
            );
            attempt += 1;
        }
    }

    async fn generate_summary(&self, examples: &[FeedbackExample]) -> Result<String, LlmError> {
        let user = format!(
            "{}\n\nFeedback:\n{}",
            self.generate_prompt,
            render_feedback_examples(examples)
        );
        self.complete_text(prompt::PREFERENCE_SYSTEM_PROMPT, &user)
            .await
    }

    async fn update_summary(
        &self,
        current: &str,
        examples: &[FeedbackExample],
    ) -> Result<String, LlmError> {
        let user = format!(
            "{}\n\nCurrent summary:\n{}\n\nNew feedback:\n{}",
            self.update_prompt,
            current,
            render_feedback_examples(examples)
        );
        self.complete_text(prompt::PREFERENCE_SYSTEM_PROMPT, &user)
            .await
    }
}

fn render_feedback_examples(examples: &[FeedbackExample]) -> String {
    if examples.is_empty() {
        return "(no feedback yet)".to_string();
    }
    examples
        .iter()
        .map(|example| {
            let kind = match example.feedback {
                Feedback::Like => "Liked",
                Feedback::Dislike => "Disliked",
                Feedback::None => "Seen",
            };
            let mut block = format!("{} article: {}", kind, example.title);
            if !example.description.is_empty() {
                block.push_str(&format!("\n  Description: {}", example.description));
            }
            if !example.content_prefix.is_empty() {
                block.push_str(&format!("\n  Content: {}", example.content_prefix));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}
