//! Context-window accounting for chat histories.

use serde::Serialize;

use crate::tokens::{self, Message};

pub const DEFAULT_MAX_TOKENS: usize = 200_000;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageUsage {
    pub role: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextAnalysis {
    pub messages: Vec<MessageUsage>,
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub percent_used: f64,
    pub remaining: i64,
    pub status: ContextStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedMessage {
    /// Position in the input history.
    pub index: usize,
    pub role: String,
    pub tokens: usize,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Optimization {
    pub to_remove: Vec<RankedMessage>,
    pub to_keep: Vec<RankedMessage>,
    pub tokens_saved: usize,
    pub percent_reduction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub summarized: Vec<Message>,
    pub original_tokens: usize,
    pub new_tokens: usize,
    pub savings: i64,
    pub percent_saved: f64,
}

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

struct Hyperparameters {
    warning_percent: f64,
    critical_percent: f64,
    recency_weight: f64,
    short_message_tokens: usize,
    short_message_bonus: f64,
    long_message_tokens: usize,
    long_message_penalty: f64,
    system_bonus: f64,
    assistant_bonus: f64,
    structured_bonus: f64,
    summary_min_tokens: usize,
    summary_chars: usize,
}

static HP: Hyperparameters = Hyperparameters {
    warning_percent: 70.0,
    critical_percent: 90.0,
    recency_weight: 40.0,
    short_message_tokens: 50,
    short_message_bonus: 20.0,
    long_message_tokens: 1000,
    long_message_penalty: -10.0,
    system_bonus: 30.0,
    assistant_bonus: 10.0,
    structured_bonus: 15.0,
    summary_min_tokens: 500,
    summary_chars: 500,
};

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        ((part as f64 / whole as f64) * 1000.0).round() / 10.0
    }
}

/// Band from the unrounded ratio. Any usage of a zero-sized window is
/// critical.
fn status_for(total: usize, max: usize) -> ContextStatus {
    let used = if max == 0 {
        if total == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        total as f64 / max as f64 * 100.0
    };
    if used > HP.critical_percent {
        ContextStatus::Critical
    } else if used > HP.warning_percent {
        ContextStatus::Warning
    } else {
        ContextStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn analyze(messages: &[Message], max_tokens: usize) -> ContextAnalysis {
    let usage: Vec<MessageUsage> = messages
        .iter()
        .map(|m| MessageUsage {
            role: m.role.clone(),
            tokens: tokens::estimate(&m.content),
        })
        .collect();
    let total_tokens: usize = usage.iter().map(|m| m.tokens).sum();
    let percent_used = percent(total_tokens, max_tokens);
    let status = status_for(total_tokens, max_tokens);

    ContextAnalysis {
        messages: usage,
        total_tokens,
        max_tokens,
        percent_used,
        remaining: max_tokens as i64 - total_tokens as i64,
        status,
    }
}

fn importance(message: &Message, index: usize, len: usize, tokens: usize) -> f64 {
    // Newest message scores 1.0, oldest 1/len.
    let recency = (index + 1) as f64 / len as f64;
    let mut score = recency * HP.recency_weight;
    if tokens < HP.short_message_tokens {
        score += HP.short_message_bonus;
    }
    if tokens > HP.long_message_tokens {
        score += HP.long_message_penalty;
    }
    match message.role.as_str() {
        "system" => score += HP.system_bonus,
        "assistant" => score += HP.assistant_bonus,
        _ => {}
    }
    if message.content.contains("```") || message.content.contains("json") {
        score += HP.structured_bonus;
    }
    score
}

/// Pick low-importance, non-system messages to drop until roughly
/// `target_reduction` of the history's tokens would be freed.
pub fn suggest_optimization(messages: &[Message], target_reduction: f64) -> Optimization {
    let len = messages.len();
    let mut ranked: Vec<RankedMessage> = messages
        .iter()
        .enumerate()
        .map(|(index, m)| {
            let tokens = tokens::estimate(&m.content);
            RankedMessage {
                index,
                role: m.role.clone(),
                tokens,
                importance: importance(m, index, len, tokens),
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.importance.total_cmp(&b.importance));

    let total: usize = ranked.iter().map(|m| m.tokens).sum();
    let target = (total as f64 * target_reduction).floor() as usize;

    let mut tokens_saved = 0;
    let (mut to_remove, mut to_keep) = (Vec::new(), Vec::new());
    for message in ranked {
        if tokens_saved < target && message.role != "system" {
            tokens_saved += message.tokens;
            to_remove.push(message);
        } else {
            to_keep.push(message);
        }
    }

    Optimization {
        to_remove,
        to_keep,
        tokens_saved,
        percent_reduction: percent(tokens_saved, total),
    }
}

/// Merge consecutive messages from the same role, truncating merged runs
/// that are still large.
pub fn summarize(messages: &[Message]) -> Summary {
    let mut groups: Vec<(&str, Vec<&Message>)> = Vec::new();
    for m in messages {
        match groups.last_mut() {
            Some((role, group)) if *role == m.role => group.push(m),
            _ => groups.push((m.role.as_str(), vec![m])),
        }
    }

    let summarized: Vec<Message> = groups
        .into_iter()
        .map(|(role, group)| {
            if group.len() == 1 {
                return group[0].clone();
            }
            let combined = group
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let tokens = tokens::estimate(&combined);
            if tokens < HP.summary_min_tokens {
                Message::new(role, combined)
            } else {
                let head: String = combined.chars().take(HP.summary_chars).collect();
                Message::new(
                    role,
                    format!(
                        "[Summary of {} messages, {tokens} tokens]:\n{head}...",
                        group.len()
                    ),
                )
            }
        })
        .collect();

    let original_tokens = tokens::from_messages(messages);
    let new_tokens = tokens::from_messages(&summarized);
    let percent_saved = if original_tokens == 0 {
        0.0
    } else {
        ((1.0 - new_tokens as f64 / original_tokens as f64) * 1000.0).round() / 10.0
    };

    Summary {
        summarized,
        original_tokens,
        new_tokens,
        savings: original_tokens as i64 - new_tokens as i64,
        percent_saved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn status_bands() {
        let msgs = vec![Message::new("user", words(100))];
        // 100 words: max(75, 499/4) = 125 tokens
        assert_eq!(analyze(&msgs, 1000).status, ContextStatus::Ok);
        assert_eq!(analyze(&msgs, 160).status, ContextStatus::Warning);
        assert_eq!(analyze(&msgs, 130).status, ContextStatus::Critical);
        assert_eq!(analyze(&msgs, 100).remaining, -25);
    }

    #[test]
    fn band_uses_unrounded_usage() {
        // One 36016-char word: 9004 tokens, 90.04% of 10000.
        let msgs = vec![Message::new("user", "x".repeat(36016))];
        let analysis = analyze(&msgs, 10_000);
        assert_eq!(analysis.total_tokens, 9004);
        assert_eq!(analysis.percent_used, 90.0);
        assert_eq!(analysis.status, ContextStatus::Critical);
    }

    #[test]
    fn zero_sized_window() {
        let msgs = vec![Message::new("user", "hello there")];
        assert_eq!(analyze(&msgs, 0).status, ContextStatus::Critical);
        assert_eq!(analyze(&[], 0).status, ContextStatus::Ok);
    }

    #[test]
    fn empty_history() {
        let analysis = analyze(&[], DEFAULT_MAX_TOKENS);
        assert_eq!(analysis.total_tokens, 0);
        assert_eq!(analysis.percent_used, 0.0);
        let opt = suggest_optimization(&[], 0.3);
        assert!(opt.to_remove.is_empty());
        assert_eq!(opt.percent_reduction, 0.0);
    }

    #[test]
    fn optimization_never_drops_system_messages() {
        let msgs = vec![
            Message::new("system", words(400)),
            Message::new("user", words(400)),
            Message::new("assistant", words(400)),
            Message::new("user", "short follow-up"),
        ];
        let opt = suggest_optimization(&msgs, 0.9);
        assert!(opt.to_remove.iter().all(|m| m.role != "system"));
        assert!(opt.to_keep.iter().any(|m| m.role == "system"));
        assert!(opt.tokens_saved > 0);
    }

    #[test]
    fn oldest_user_message_goes_first() {
        let msgs = vec![
            Message::new("user", words(200)),
            Message::new("assistant", words(200)),
            Message::new("user", words(200)),
        ];
        let opt = suggest_optimization(&msgs, 0.2);
        assert_eq!(opt.to_remove.len(), 1);
        assert_eq!(opt.to_remove[0].index, 0);
    }

    #[test]
    fn summarize_merges_same_role_runs() {
        let msgs = vec![
            Message::new("user", "first"),
            Message::new("user", "second"),
            Message::new("assistant", "reply"),
        ];
        let summary = summarize(&msgs);
        assert_eq!(summary.summarized.len(), 2);
        assert_eq!(summary.summarized[0].content, "first\n\nsecond");
        assert_eq!(summary.summarized[1].content, "reply");
    }

    #[test]
    fn summarize_truncates_large_runs() {
        let msgs = vec![
            Message::new("user", words(600)),
            Message::new("user", words(600)),
        ];
        let summary = summarize(&msgs);
        assert!(summary.summarized[0]
            .content
            .starts_with("[Summary of 2 messages"));
        assert!(summary.new_tokens < summary.original_tokens);
        assert!(summary.percent_saved > 0.0);
    }
}
