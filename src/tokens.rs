//! Token estimation.
//!
//! A word/character heuristic in the style of GPT tokenizers: roughly
//! 0.75 tokens per word or one token per four characters, whichever is
//! larger.

use serde::{Deserialize, Serialize};

const TOKENS_PER_WORD: f64 = 0.75;
const CHARS_PER_TOKEN: f64 = 4.0;

/// A chat message as seen by token and context accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Estimate the token count of `text`. Empty input is zero tokens.
pub fn estimate(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    // Whitespace-only text still counts as one (empty) word.
    let words = text.split_whitespace().count().max(1);
    let chars = text.chars().count();
    let by_words = words as f64 * TOKENS_PER_WORD;
    let by_chars = chars as f64 / CHARS_PER_TOKEN;
    by_words.max(by_chars).ceil() as usize
}

pub fn from_messages(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate(&m.content)).sum()
}
