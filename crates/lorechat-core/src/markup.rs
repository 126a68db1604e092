//! Narrative/dialogue markup for assistant replies
//!
//! Replies wrap descriptive prose in single asterisks (`*she turns away*`)
//! and leave spoken lines bare. Only fully paired spans on one line count as
//! narrative; anything else stays literal.

use crate::state::{ChatMessage, ChatRole};
use regex::Regex;
use std::sync::OnceLock;

/// One styled run of an assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that was wrapped in asterisks, delimiters removed
    Narrative(String),
    /// Plain text between narrative spans, trimmed
    Dialogue(String),
}

/// How a stored message should be displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Segments(Vec<Segment>),
    Verbatim(String),
}

fn narrative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*.*?\*").expect("narrative pattern is valid"))
}

fn push_dialogue(segments: &mut Vec<Segment>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Dialogue(trimmed.to_string()));
    }
}

/// Split a reply into alternating narrative and dialogue segments
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for m in narrative_pattern().find_iter(text) {
        push_dialogue(&mut segments, &text[last_end..m.start()]);
        let span = m.as_str();
        segments.push(Segment::Narrative(span[1..span.len() - 1].to_string()));
        last_end = m.end();
    }
    push_dialogue(&mut segments, &text[last_end..]);

    segments
}

/// Assistant replies are split into segments; user messages are shown as typed
pub fn render_message(message: &ChatMessage) -> MessageBody {
    match message.role {
        ChatRole::Assistant => MessageBody::Segments(split_segments(&message.content)),
        ChatRole::User => MessageBody::Verbatim(message.content.clone()),
    }
}
