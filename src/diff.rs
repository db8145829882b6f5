//! Line and word diffs between two prompt versions.
//!
//! The walk is greedy: two cursors advance through the old and new
//! sequences, and on a mismatch a single lookahead decides between an
//! insertion, a deletion, or an in-place modification. It is not a minimal
//! edit script and can produce surprising output on inputs with many
//! repeated lines, but it always terminates and always accounts for every
//! line of both inputs exactly once.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiffOp {
    Equal {
        content: String,
        line_num: usize,
    },
    Add {
        content: String,
        line_num: usize,
    },
    Remove {
        content: String,
        line_num: usize,
    },
    Modify {
        old_content: String,
        new_content: String,
        line_num: usize,
    },
}

impl DiffOp {
    pub fn line_num(&self) -> usize {
        match self {
            DiffOp::Equal { line_num, .. }
            | DiffOp::Add { line_num, .. }
            | DiffOp::Remove { line_num, .. }
            | DiffOp::Modify { line_num, .. } => *line_num,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WordKind {
    Equal,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordOp {
    #[serde(rename = "type")]
    pub kind: WordKind,
    pub word: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Equal,
    Add,
    Remove,
    Modify,
}

/// One side of a side-by-side row. Unmodified lines carry a single span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideCell {
    pub line_num: usize,
    pub kind: CellKind,
    pub spans: Vec<WordOp>,
}

impl SideCell {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.word.as_str()).collect()
    }
}

/// A row of the side-by-side view; `None` is an empty placeholder cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideBySideRow {
    pub old: Option<SideCell>,
    pub new: Option<SideCell>,
}

// ---------------------------------------------------------------------------
// Greedy walk
// ---------------------------------------------------------------------------

enum Step {
    Equal(usize),
    Add(usize),
    Remove(usize),
    Modify(usize, usize),
}

fn greedy_walk<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);

    while i < old.len() || j < new.len() {
        if i >= old.len() {
            steps.push(Step::Add(j));
            j += 1;
        } else if j >= new.len() {
            steps.push(Step::Remove(i));
            i += 1;
        } else if old[i] == new[j] {
            steps.push(Step::Equal(i));
            i += 1;
            j += 1;
        } else {
            let old_in_new = new[j..].iter().position(|x| *x == old[i]);
            let new_in_old = old[i..].iter().position(|x| *x == new[j]);
            match (old_in_new, new_in_old) {
                // The old line shows up later in new, no later than the new
                // line shows up in old: new[j] was inserted.
                (Some(a), b) if b.map_or(true, |b| a <= b) => {
                    steps.push(Step::Add(j));
                    j += 1;
                }
                (_, Some(_)) => {
                    steps.push(Step::Remove(i));
                    i += 1;
                }
                _ => {
                    steps.push(Step::Modify(i, j));
                    i += 1;
                    j += 1;
                }
            }
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn calculate_diff(old_text: &str, new_text: &str) -> Vec<DiffOp> {
    let old: Vec<&str> = old_text.split('\n').collect();
    let new: Vec<&str> = new_text.split('\n').collect();

    greedy_walk(&old, &new)
        .into_iter()
        .map(|step| match step {
            Step::Equal(i) => DiffOp::Equal {
                content: old[i].to_string(),
                line_num: i + 1,
            },
            Step::Add(j) => DiffOp::Add {
                content: new[j].to_string(),
                line_num: j + 1,
            },
            Step::Remove(i) => DiffOp::Remove {
                content: old[i].to_string(),
                line_num: i + 1,
            },
            Step::Modify(i, j) => DiffOp::Modify {
                old_content: old[i].to_string(),
                new_content: new[j].to_string(),
                line_num: i + 1,
            },
        })
        .collect()
}

/// Split into alternating runs of whitespace and non-whitespace, keeping both.
fn word_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        if in_space.is_some_and(|s| s != space) {
            tokens.push(&text[start..idx]);
            start = idx;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Word-level diff for a modified line. Whitespace runs are tokens too, so
/// concatenating the non-added words yields the old line and the non-removed
/// words yield the new line.
pub fn calculate_word_diff(old_text: &str, new_text: &str) -> Vec<WordOp> {
    let old = word_tokens(old_text);
    let new = word_tokens(new_text);
    let word = |kind, w: &str| WordOp {
        kind,
        word: w.to_string(),
    };

    let mut ops = Vec::new();
    for step in greedy_walk(&old, &new) {
        match step {
            Step::Equal(i) => ops.push(word(WordKind::Equal, old[i])),
            Step::Add(j) => ops.push(word(WordKind::Add, new[j])),
            Step::Remove(i) => ops.push(word(WordKind::Remove, old[i])),
            Step::Modify(i, j) => {
                ops.push(word(WordKind::Remove, old[i]));
                ops.push(word(WordKind::Add, new[j]));
            }
        }
    }
    ops
}

pub fn stats(diff: &[DiffOp]) -> DiffStats {
    diff.iter().fold(DiffStats::default(), |mut s, op| {
        match op {
            DiffOp::Equal { .. } => s.unchanged += 1,
            DiffOp::Add { .. } => s.additions += 1,
            DiffOp::Remove { .. } => s.deletions += 1,
            DiffOp::Modify { .. } => s.modifications += 1,
        }
        s
    })
}

/// The old text, rebuilt from a diff.
pub fn old_text(diff: &[DiffOp]) -> String {
    diff.iter()
        .filter_map(|op| match op {
            DiffOp::Equal { content, .. } | DiffOp::Remove { content, .. } => Some(content.as_str()),
            DiffOp::Modify { old_content, .. } => Some(old_content.as_str()),
            DiffOp::Add { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The new text, rebuilt by applying a diff's additions and removals.
pub fn new_text(diff: &[DiffOp]) -> String {
    diff.iter()
        .filter_map(|op| match op {
            DiffOp::Equal { content, .. } | DiffOp::Add { content, .. } => Some(content.as_str()),
            DiffOp::Modify { new_content, .. } => Some(new_content.as_str()),
            DiffOp::Remove { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `git diff`-style rendering without hunk headers.
pub fn render_unified(diff: &[DiffOp]) -> String {
    let mut lines = Vec::with_capacity(diff.len());
    for op in diff {
        match op {
            DiffOp::Equal { content, .. } => lines.push(format!(" {content}")),
            DiffOp::Remove { content, .. } => lines.push(format!("-{content}")),
            DiffOp::Add { content, .. } => lines.push(format!("+{content}")),
            DiffOp::Modify {
                old_content,
                new_content,
                ..
            } => {
                lines.push(format!("-{old_content}"));
                lines.push(format!("+{new_content}"));
            }
        }
    }
    lines.join("\n")
}

fn whole_line(line_num: usize, kind: CellKind, word_kind: WordKind, content: &str) -> SideCell {
    SideCell {
        line_num,
        kind,
        spans: vec![WordOp {
            kind: word_kind,
            word: content.to_string(),
        }],
    }
}

pub fn side_by_side(diff: &[DiffOp]) -> Vec<SideBySideRow> {
    diff.iter()
        .map(|op| match op {
            DiffOp::Equal { content, line_num } => SideBySideRow {
                old: Some(whole_line(*line_num, CellKind::Equal, WordKind::Equal, content)),
                new: Some(whole_line(*line_num, CellKind::Equal, WordKind::Equal, content)),
            },
            DiffOp::Remove { content, line_num } => SideBySideRow {
                old: Some(whole_line(*line_num, CellKind::Remove, WordKind::Remove, content)),
                new: None,
            },
            DiffOp::Add { content, line_num } => SideBySideRow {
                old: None,
                new: Some(whole_line(*line_num, CellKind::Add, WordKind::Add, content)),
            },
            DiffOp::Modify {
                old_content,
                new_content,
                line_num,
            } => {
                let words = calculate_word_diff(old_content, new_content);
                let side = |hidden: WordKind| SideCell {
                    line_num: *line_num,
                    kind: CellKind::Modify,
                    spans: words.iter().filter(|w| w.kind != hidden).cloned().collect(),
                };
                SideBySideRow {
                    old: Some(side(WordKind::Add)),
                    new: Some(side(WordKind::Remove)),
                }
            }
        })
        .collect()
}
