//! Prompt analysis and management.
//!
//! Heuristic scoring of LLM prompts (tokens, cost, techniques, quality,
//! security), rule-based rewriting, line and word diffs between prompt
//! versions, branching conversations with a tree layout, context-window
//! accounting, model routing, and a prompt library behind a key-value
//! storage boundary. Recorded model outputs, A/B tests between prompt
//! variants and a few-shot example library persist through the same
//! boundary.
//!
//! The analysis functions never fail: any input yields a best-effort
//! record. Only library, conversation and storage mutations return
//! [`Result`].

pub mod ab_test;
pub mod assistant;
pub mod context;
pub mod conversation;
pub mod cost;
pub mod diff;
pub mod error;
pub mod few_shot;
pub mod layout;
pub mod library;
pub mod outputs;
pub mod patterns;
pub mod quality;
pub mod router;
pub mod security;
pub mod storage;
pub mod tokens;

pub use conversation::{Conversation, NodeId, Role};
pub use diff::{calculate_diff, calculate_word_diff, DiffOp};
pub use error::{Error, Result, StorageError};
pub use library::PromptLibrary;
pub use patterns::TaskType;
pub use quality::{analyze, Grade, QualityResult};
pub use security::{sanitize, scan, SecurityReport};
pub use tokens::Message;
