//! Few-shot example library.
//!
//! Input/output pairs are filed under a category and spliced into prompts
//! on demand. Pairs can also be lifted out of an existing prompt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{self, KeyValueStore};

pub const DEFAULT_EXAMPLE_COUNT: usize = 3;
pub const STORAGE_KEY: &str = "examples_library";
const NO_EXAMPLES: &str = "(No examples available)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewExample {
    pub input: String,
    pub output: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// An input/output pair found in prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedExample {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleLibrary {
    categories: BTreeMap<String, Vec<Example>>,
}

// Up to the start of the output; where the output ends is decided by
// END_OF_OUTPUT.
static PAIR_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:example|input)[:\s]*(.+?)\s*(?:output|result)[:\s]*").unwrap()
});
static END_OF_OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\n\n|example").unwrap());

impl ExampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<K: KeyValueStore>(store: &K) -> Result<Self> {
        storage::load_value(store, STORAGE_KEY)
    }

    pub fn save<K: KeyValueStore>(&self, store: &mut K) -> Result<()> {
        storage::save_value(store, STORAGE_KEY, self)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn examples(&self, category: &str) -> &[Example] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add(&mut self, category: &str, example: NewExample) -> Result<String> {
        let category = category.trim();
        if category.is_empty() {
            return Err(Error::invalid("category", "must not be empty"));
        }
        if example.input.trim().is_empty() || example.output.trim().is_empty() {
            return Err(Error::invalid("example", "input and output are required"));
        }

        let id = format!("example_{}", Uuid::new_v4().simple());
        self.categories
            .entry(category.to_string())
            .or_default()
            .push(Example {
                id: id.clone(),
                input: example.input,
                output: example.output,
                description: example.description,
                tags: example.tags,
                created_at: Utc::now(),
            });
        Ok(id)
    }

    pub fn remove(&mut self, category: &str, id: &str) -> Result<Example> {
        let list = self
            .categories
            .get_mut(category)
            .ok_or_else(|| Error::not_found("category", category))?;
        let index = list
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::not_found("example", id))?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.categories.remove(category);
        }
        Ok(removed)
    }

    /// Append the first `count` examples of `category` to `base`.
    pub fn few_shot_prompt(&self, base: &str, category: &str, count: usize) -> String {
        let examples = self.examples(category);
        if examples.is_empty() {
            return format!("{base}\n\n{NO_EXAMPLES}");
        }
        let blocks: Vec<String> = examples
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, ex)| format!("Example {}:\nInput: {}\nOutput: {}", i + 1, ex.input, ex.output))
            .collect();
        format!("{base}\n\nHere are some examples:\n\n{}", blocks.join("\n\n"))
    }

    /// File every pair found in `text` under `category`.
    pub fn import_from_prompt(&mut self, category: &str, text: &str) -> Result<usize> {
        let pairs = parse_examples(text);
        for pair in &pairs {
            self.add(
                category,
                NewExample {
                    input: pair.input.clone(),
                    output: pair.output.clone(),
                    ..NewExample::default()
                },
            )?;
        }
        info!(category, count = pairs.len(), "imported examples from prompt");
        Ok(pairs.len())
    }
}

/// Input/output pairs in `text`. A pair starts at "example" or "input",
/// its output follows "output" or "result" and runs to the next blank line,
/// the next "example", or the end.
pub fn parse_examples(text: &str) -> Vec<ParsedExample> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(caps) = PAIR_HEAD.captures_at(text, pos) {
        let (Some(head), Some(input)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let start = head.end();
        // The output is at least one character long.
        let Some(first) = text[start..].chars().next() else {
            break;
        };
        let end = END_OF_OUTPUT
            .find_at(text, start + first.len_utf8())
            .map_or(text.len(), |m| m.start());
        found.push(ParsedExample {
            input: input.as_str().trim().to_string(),
            output: text[start..end].trim().to_string(),
        });
        pos = end;
    }
    found
}
