//! Summary policy: forbidden meta-language openers.
//!
//! Generated summaries must dive straight into the subject matter.
//! Openers like "The article discusses" are rejected; the classifier
//! retries the batch and, on the final attempt, strips the prefix and
//! uppercases the new first letter instead of rejecting the output.

/// Built-in forbidden summary openers, matched case-insensitively.
const BUILTIN_FORBIDDEN_PREFIXES: &[&str] = &[
    "The article discusses",
    "The article describes",
    "The article explores",
    "The article examines",
    "The article explains",
    "The article covers",
    "The article presents",
    "The article details",
    "The article highlights",
    "The article reports",
    "The article outlines",
    "The article looks at",
    "The article focuses on",
    "The article talks about",
    "This article discusses",
    "This article describes",
    "This article explores",
    "This article explains",
    "This article covers",
    "This article presents",
    "This post explores",
    "This post discusses",
    "This post describes",
    "The post discusses",
    "The post describes",
    "The post explains",
    "The author explains",
    "The author discusses",
    "The author describes",
    "The author argues",
    "The author presents",
    "The author writes",
    "The piece discusses",
    "The piece explores",
    "This piece discusses",
    "The text discusses",
    "The text describes",
    "The content discusses",
    "The story discusses",
    "The story covers",
    "The report details",
    "The report discusses",
    "In this article",
    "In this post",
];

/// The built-in forbidden prefix list plus any configured extras.
pub fn forbidden_prefixes(extra: &[String]) -> Vec<String> {
    let mut prefixes: Vec<String> = BUILTIN_FORBIDDEN_PREFIXES
        .iter()
        .map(|p| (*p).to_string())
        .collect();
    prefixes.extend(extra.iter().cloned());
    prefixes
}

/// Return the forbidden prefix the summary starts with, if any.
///
/// Matching is case-insensitive and ignores leading whitespace.
pub fn find_forbidden_prefix<'a>(summary: &str, prefixes: &'a [String]) -> Option<&'a str> {
    let lowered = summary.trim_start().to_lowercase();
    prefixes
        .iter()
        .find(|p| lowered.starts_with(&p.to_lowercase()))
        .map(String::as_str)
}

/// Remove a forbidden prefix and uppercase the first letter of what remains.
pub fn strip_forbidden_prefix(summary: &str, prefix: &str) -> String {
    let trimmed = summary.trim_start();
    let rest: String = trimmed.chars().skip(prefix.chars().count()).collect();
    let rest = rest.trim_start_matches([' ', ':', ',', '-', '\u{2013}']);

    let mut chars = rest.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
