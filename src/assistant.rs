//! Rule-based prompt rewriting: suggestions, improvement, compression and
//! A/B variations. Nothing here calls a model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::patterns::TaskType;
use crate::tokens;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Structure,
    Context,
    Enhancement,
    Format,
    Reasoning,
    Constraints,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub title: &'static str,
    pub before: String,
    pub after: String,
    pub explanation: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImproveOptions {
    pub add_role: bool,
    pub add_chain_of_thought: bool,
    pub add_examples: bool,
    pub add_format: bool,
    pub task: TaskType,
}

impl Default for ImproveOptions {
    fn default() -> Self {
        Self {
            add_role: true,
            add_chain_of_thought: false,
            add_examples: false,
            add_format: true,
            task: TaskType::General,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Compressed {
    pub compressed: String,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub savings: i64,
    pub savings_percent: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variation {
    pub name: &'static str,
    pub prompt: String,
    pub expected_benefit: String,
}

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

static ACTION_VERB_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:write|create|generate|analyze|explain|summarize|list|describe)").unwrap()
});
static FORMAT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"format|structure|output as|provide as|return").unwrap());
static CONSTRAINT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"must|should|do not|never|requirements").unwrap());
static IMPROVED_FORMAT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)format|structure|output").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static FILLERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:please|kindly|I would like you to|could you|can you|I need you to)\b")
        .unwrap()
});
static REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)that is to say", "i.e."),
        (r"(?i)for example", "e.g."),
        (r"(?i)in other words", ""),
    ]
    .into_iter()
    .map(|(pat, with)| (Regex::new(pat).unwrap(), with))
    .collect()
});

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn head(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn role_for(task: TaskType) -> &'static str {
    match task {
        TaskType::Code => "You are an expert software engineer.",
        TaskType::Writing => "You are a professional writer and editor.",
        TaskType::Analysis => "You are a data analyst and critical thinker.",
        TaskType::General | TaskType::Reasoning => "You are a helpful AI assistant.",
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Rule-based suggestions, highest priority first. Rules of equal priority
/// keep their evaluation order.
pub fn suggestions(text: &str, task: TaskType) -> Vec<Suggestion> {
    let lower = text.to_lowercase();
    let len = text.chars().count();
    let mut out = Vec::new();

    if !ACTION_VERB_START.is_match(&lower) {
        out.push(Suggestion {
            kind: SuggestionKind::Structure,
            priority: Priority::High,
            title: "Start with clear action verb",
            before: format!("{}...", head(text, 50)),
            after: format!("Write a {}...", head(text, 50)),
            explanation: "Starting with a clear verb (Write, Create, Analyze) improves clarity",
        });
    }

    if !lower.contains("you are") && !lower.contains("act as") {
        out.push(Suggestion {
            kind: SuggestionKind::Context,
            priority: Priority::Medium,
            title: "Add expert role",
            before: head(text, 50),
            after: format!("You are an expert [field]. {}", head(text, 50)),
            explanation: "Defining a role/expertise improves response quality",
        });
    }

    if len > 100 && !lower.contains("example") && !lower.contains("like this") {
        out.push(Suggestion {
            kind: SuggestionKind::Enhancement,
            priority: Priority::High,
            title: "Add examples",
            before: text.to_string(),
            after: format!("{text}\n\nExample:\nInput: [example input]\nOutput: [desired output]"),
            explanation: "Examples (few-shot learning) dramatically improve accuracy",
        });
    }

    if !FORMAT_WORDS.is_match(&lower) {
        out.push(Suggestion {
            kind: SuggestionKind::Format,
            priority: Priority::Medium,
            title: "Specify output format",
            before: text.to_string(),
            after: format!("{text}\n\nProvide output as: [markdown/JSON/bullet points]"),
            explanation: "Explicit format reduces ambiguity",
        });
    }

    if task == TaskType::Reasoning
        && !lower.contains("step by step")
        && !lower.contains("think through")
    {
        out.push(Suggestion {
            kind: SuggestionKind::Reasoning,
            priority: Priority::High,
            title: "Add chain-of-thought",
            before: text.to_string(),
            after: format!("{text}\n\nThink step by step and show your reasoning."),
            explanation: "Chain-of-thought improves reasoning tasks by 30-50%",
        });
    }

    if len > 50 && !CONSTRAINT_WORDS.is_match(&lower) {
        out.push(Suggestion {
            kind: SuggestionKind::Constraints,
            priority: Priority::Low,
            title: "Add constraints if needed",
            before: text.to_string(),
            after: format!("{text}\n\nRequirements:\n- [constraint 1]\n- [constraint 2]"),
            explanation: "Clear constraints prevent unwanted outputs",
        });
    }

    // sort_by is stable, so ties keep rule order
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

pub fn improve(text: &str, options: ImproveOptions) -> String {
    let mut improved = text.trim().to_string();

    if options.add_role && !improved.to_lowercase().contains("you are") {
        improved = format!("{} {improved}", role_for(options.task));
    }
    if options.add_chain_of_thought {
        improved.push_str("\n\nThink step by step and explain your reasoning.");
    }
    if options.add_examples {
        improved.push_str("\n\nExample:\nInput: [provide example]\nOutput: [show desired format]");
    }
    if options.add_format && !IMPROVED_FORMAT_WORDS.is_match(&improved) {
        improved.push_str("\n\nProvide your response in a clear, structured format.");
    }
    improved
}

pub fn compress(text: &str) -> Compressed {
    let mut out = WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned();
    out = FILLERS.replace_all(&out, "").into_owned();
    for (re, with) in REWRITES.iter() {
        out = re.replace_all(&out, *with).into_owned();
    }
    let compressed = WHITESPACE_RUN.replace_all(&out, " ").trim().to_string();

    let original_tokens = tokens::estimate(text);
    let compressed_tokens = tokens::estimate(&compressed);
    let savings = original_tokens as i64 - compressed_tokens as i64;
    let savings_percent = if original_tokens == 0 {
        0
    } else {
        (savings as f64 / original_tokens as f64 * 100.0).round() as i64
    };

    Compressed {
        compressed,
        original_tokens,
        compressed_tokens,
        savings,
        savings_percent,
    }
}

/// Up to four variants for A/B testing, in a fixed order.
pub fn variations(text: &str, count: usize) -> Vec<Variation> {
    let compressed = compress(text);
    let all = vec![
        Variation {
            name: "With Chain-of-Thought",
            prompt: improve(
                text,
                ImproveOptions {
                    add_chain_of_thought: true,
                    ..ImproveOptions::default()
                },
            ),
            expected_benefit: "Better reasoning quality".to_string(),
        },
        Variation {
            name: "With Expert Role",
            prompt: improve(text, ImproveOptions::default()),
            expected_benefit: "More authoritative responses".to_string(),
        },
        Variation {
            name: "With Examples",
            prompt: improve(
                text,
                ImproveOptions {
                    add_examples: true,
                    ..ImproveOptions::default()
                },
            ),
            expected_benefit: "Better format adherence".to_string(),
        },
        Variation {
            name: "Compressed",
            prompt: compressed.compressed,
            expected_benefit: format!("{}% cost reduction", compressed.savings_percent),
        },
    ];
    all.into_iter().take(count).collect()
}
