//! Link guard for generated replies.
//!
//! A reply may only contain links that appeared in the retrieved context.
//! Every other `http(s)` URL is replaced by [`LINK_PLACEHOLDER`]; when no
//! context was supplied, every URL is replaced.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Replacement text for links that were not in the context.
pub const LINK_PLACEHOLDER: &str = "[link not available]";

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"]+"#).expect("url regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', ')', '،', '؛'];

/// All `http(s)` URLs in `text`, in order of appearance, without trailing
/// sentence punctuation.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| split_trailing(m.as_str()).0.to_string())
        .collect()
}

/// Byte ranges of the raw URL matches in `text`.
pub(crate) fn url_spans(text: &str) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
    URL_RE.find_iter(text).map(|m| m.range())
}

/// Comparison form: trailing punctuation and slashes stripped, lowercased.
pub fn normalize_url(url: &str) -> String {
    split_trailing(url)
        .0
        .trim_end_matches('/')
        .to_lowercase()
}

fn split_trailing(url: &str) -> (&str, &str) {
    let core = url.trim_end_matches(TRAILING_PUNCTUATION);
    (core, &url[core.len()..])
}

/// Outcome of [`guard_links`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedReply {
    pub text: String,
    /// URLs that were replaced, as written by the model.
    pub removed: Vec<String>,
}

/// Replace every URL in `reply` that is not among `allowed`.
pub fn guard_links(reply: &str, allowed: &[String]) -> GuardedReply {
    let allowed: HashSet<String> = allowed.iter().map(|u| normalize_url(u)).collect();
    let mut removed = Vec::new();

    let text = URL_RE
        .replace_all(reply, |caps: &regex::Captures<'_>| {
            let raw = &caps[0];
            let (core, trailing) = split_trailing(raw);
            if allowed.contains(&normalize_url(core)) {
                raw.to_string()
            } else {
                removed.push(core.to_string());
                format!("{LINK_PLACEHOLDER}{trailing}")
            }
        })
        .into_owned();

    if !removed.is_empty() {
        tracing::warn!(
            removed = removed.len(),
            urls = ?removed,
            "Replaced links that were not in the retrieved context"
        );
    }

    GuardedReply { text, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["https://roadmap.sh/backend".to_string()]
    }

    #[test]
    fn test_known_link_survives_normalization() {
        let reply = "Start here: HTTPS://roadmap.sh/Backend/. Good luck!";
        let guarded = guard_links(reply, &allowed());
        assert_eq!(guarded.text, reply);
        assert!(guarded.removed.is_empty());
    }

    #[test]
    fn test_invented_link_is_replaced() {
        let reply = "See https://roadmap.sh/backend and https://example.com/course.";
        let guarded = guard_links(reply, &allowed());
        assert_eq!(
            guarded.text,
            format!("See https://roadmap.sh/backend and {LINK_PLACEHOLDER}.")
        );
        assert_eq!(guarded.removed, vec!["https://example.com/course"]);
    }

    #[test]
    fn test_no_context_removes_every_link() {
        let guarded = guard_links("ده اللينك: https://roadmap.sh/backend", &[]);
        assert!(!guarded.text.contains("http"));
        assert_eq!(guarded.removed.len(), 1);
    }

    #[test]
    fn test_reply_without_links_is_untouched() {
        let guarded = guard_links("No links here.", &[]);
        assert_eq!(guarded.text, "No links here.");
    }

    #[test]
    fn test_extract_urls_strips_punctuation() {
        let urls = extract_urls("Link: https://roadmap.sh/python, then (https://roadmap.sh/sql).");
        assert_eq!(urls, vec!["https://roadmap.sh/python", "https://roadmap.sh/sql"]);
    }
}
