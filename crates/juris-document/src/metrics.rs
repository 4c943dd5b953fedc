//! Display metrics computed once a message is final

use juris_ai::prompt::legal_citation_pattern;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Average reading speed used for the time estimate
pub const WORDS_PER_MINUTE: usize = 200;

/// At most this many heading topics are reported
pub const MAX_TOPICS: usize = 5;

static EXAMPLE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[/exemplo\]|\[exemplo(?::[^\]\n]*)?\]|\bpor exemplo\b|\bexemplos?\b|\bex\.:|\bcaso prático\b")
        .expect("invalid example marker regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMetrics {
    pub word_count: usize,
    pub reading_time_minutes: usize,
    pub citation_count: usize,
    pub example_count: usize,
    pub topics: Vec<String>,
}

/// Compute display metrics for a finished message
pub fn compute(text: &str) -> DisplayMetrics {
    let word_count = text
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count();

    let reading_time_minutes = if text.trim().is_empty() {
        0
    } else {
        word_count.div_ceil(WORDS_PER_MINUTE).max(1)
    };

    DisplayMetrics {
        word_count,
        reading_time_minutes,
        citation_count: legal_citation_pattern().find_iter(text).count(),
        example_count: count_examples(text),
        topics: heading_topics(text),
    }
}

fn count_examples(text: &str) -> usize {
    EXAMPLE_MARKER
        .find_iter(text)
        .filter(|m| !m.as_str().starts_with("[/"))
        .count()
}

fn heading_topics(text: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Heading { .. }) => current = Some(String::new()),
            Event::End(TagEnd::Heading(_)) => {
                if let Some(heading) = current.take() {
                    let heading = heading.trim().to_string();
                    if !heading.is_empty() && !topics.contains(&heading) {
                        topics.push(heading);
                        if topics.len() == MAX_TOPICS {
                            break;
                        }
                    }
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(heading) = current.as_mut() {
                    heading.push_str(&t);
                }
            }
            _ => {}
        }
    }

    topics
}
