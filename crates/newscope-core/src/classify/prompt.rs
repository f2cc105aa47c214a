//! Deterministic prompt construction for the classification stage.
//!
//! The user message is assembled in a fixed section order, each section
//! omitted when empty, so identical inputs always produce identical
//! prompts: preference summary, canonical topics, topic preferences,
//! recent feedback examples, the batch itself, and a trailing format
//! instruction.

use super::{ClassificationContext, ClassifyItem};
use crate::storage::items::Feedback;
use crate::storage::views::FeedbackExample;

/// Maximum content length, in characters, rendered per batch item.
pub const CONTENT_TRUNCATE_CHARS: usize = 500;

/// Embedded system prompt for classification.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a news relevance classifier. You score articles against a reader's \
preferences on a 0-10 scale: 0-2 means off-topic or junk, 3-4 marginal, \
5-6 somewhat interesting, 7-8 clearly interesting, 9-10 must-read.

For every article in the batch return an object with these fields:
- \"guid\": copied verbatim from the article header
- \"score\": a number from 0 to 10
- \"explanation\": at most 100 characters on why the score was given
- \"topics\": 1-3 short lowercase tags, always present even when the score is 0
- \"summary\": 300-500 characters, written in the article's own language

Summaries must dive directly into the subject matter. Never open with \
meta-language such as \"The article discusses\", \"This post explores\", or \
\"The author explains\".";

/// Embedded prompt used to create a preference summary from scratch.
pub const DEFAULT_GENERATE_SUMMARY_PROMPT: &str = "\
Write a concise summary (at most 150 words) of this reader's news \
preferences based on the liked and disliked articles below. Describe \
topics, sources, and styles they favor or avoid. Write in the second \
person (\"You prefer ...\") and return only the summary text.";

/// Embedded prompt used to refine an existing preference summary.
pub const DEFAULT_UPDATE_SUMMARY_PROMPT: &str = "\
Refine the reader preference summary below using the new feedback that \
follows. Keep what still holds, adjust what the new feedback contradicts, \
and stay under 150 words. Return only the updated summary text.";

/// System prompt for the preference-summary calls.
pub const PREFERENCE_SYSTEM_PROMPT: &str =
    "You maintain a short profile of a reader's news preferences.";

/// Build the user message for one classification batch.
pub fn build_user_prompt(
    ctx: &ClassificationContext,
    items: &[ClassifyItem],
    json_mode: bool,
    remind_summary_rules: bool,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !ctx.preference_summary.is_empty() {
        sections.push(format!(
            "User preference summary:\n{}",
            ctx.preference_summary
        ));
    }

    if !ctx.canonical_topics.is_empty() {
        sections.push(format!(
            "Existing topics (reuse one of these tags when it applies):\n{}",
            ctx.canonical_topics.join(", ")
        ));
    }

    let mut preferences = Vec::new();
    if !ctx.preferred_topics.is_empty() {
        preferences.push(format!(
            "Preferred topics (increase score by 1-2): {}",
            ctx.preferred_topics.join(", ")
        ));
    }
    if !ctx.avoided_topics.is_empty() {
        preferences.push(format!(
            "Avoided topics (decrease score by 1-2): {}",
            ctx.avoided_topics.join(", ")
        ));
    }
    if !preferences.is_empty() {
        sections.push(preferences.join("\n"));
    }

    if !ctx.examples.is_empty() {
        let mut lines = vec!["Recent user feedback:".to_string()];
        for example in &ctx.examples {
            lines.push(render_example(example));
        }
        sections.push(lines.join("\n"));
    }

    let mut batch = vec!["Articles to classify:".to_string()];
    for item in items {
        batch.push(render_item(item));
    }
    sections.push(batch.join("\n\n"));

    let mut instruction = if json_mode {
        "Respond with a JSON object of the form {\"classifications\": [...]} \
         containing one classification per article."
            .to_string()
    } else {
        "Respond with a bare JSON array containing one classification per article.".to_string()
    };
    if remind_summary_rules {
        instruction.push_str(
            "\nReminder: summaries must start with the subject matter itself, \
             never with openers like \"The article discusses\".",
        );
    }
    sections.push(instruction);

    sections.join("\n\n")
}

fn render_example(example: &FeedbackExample) -> String {
    let kind = match example.feedback {
        Feedback::Like => "Liked",
        Feedback::Dislike => "Disliked",
        Feedback::None => "Seen",
    };
    let mut line = format!("- {} article: {}", kind, example.title);
    if !example.topics.is_empty() {
        line.push_str(&format!(" [topics: {}]", example.topics.join(", ")));
    }
    line
}

fn render_item(item: &ClassifyItem) -> String {
    let mut lines = vec![
        format!("[guid: {}]", item.guid),
        format!("Title: {}", item.title),
    ];
    if !item.description.is_empty() {
        lines.push(format!("Description: {}", item.description));
    }
    if !item.content.is_empty() {
        lines.push(format!(
            "Content: {}",
            truncate_chars(&item.content, CONTENT_TRUNCATE_CHARS)
        ));
    }
    lines.join("\n")
}

/// Truncate to at most `max` characters, appending `...` when cut.
///
/// Operates on char boundaries, so multi-byte codepoints are never split.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}
