use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::cost::{self, CostEstimate};
use crate::patterns::{self, PatternMatch};
use crate::tokens;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityResult {
    pub score: i32,
    pub grade: Grade,
    pub tokens: usize,
    pub estimated_cost: CostEstimate,
    pub patterns: Vec<PatternMatch>,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
}

/// Builder-style dimension scores, each on a 0..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DimensionScores {
    pub clarity: f64,
    pub coverage: f64,
    pub effectiveness: f64,
    pub creativity: f64,
    pub success: f64,
}

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

struct Hyperparameters {
    base_score: i32,
    short_prompt_tokens: usize,
    short_prompt_penalty: i32,
    long_prompt_tokens: usize,
    long_prompt_penalty: i32,
    high_pattern_bonus: i32,
    no_pattern_penalty: i32,
    emotional_penalty: i32,
    vague_words: &'static [&'static str],
    vague_penalty: i32,
    structure_hint_tokens: usize,
    missing_role_penalty: i32,
    score_min: i32,
    score_max: i32,
    grade_a_min: i32,
    grade_b_min: i32,
    grade_c_min: i32,
    grade_d_min: i32,
}

static HP: Hyperparameters = Hyperparameters {
    base_score: 50,
    short_prompt_tokens: 10,
    short_prompt_penalty: -20,
    long_prompt_tokens: 2000,
    long_prompt_penalty: -10,
    high_pattern_bonus: 10,
    no_pattern_penalty: -15,
    emotional_penalty: -5,
    vague_words: &["help", "something", "stuff", "things", "good", "better"],
    vague_penalty: -10,
    structure_hint_tokens: 50,
    missing_role_penalty: -5,
    score_min: 0,
    score_max: 100,
    grade_a_min: 80,
    grade_b_min: 65,
    grade_c_min: 50,
    grade_d_min: 35,
};

pub fn grade_for_score(score: i32) -> Grade {
    if score >= HP.grade_a_min {
        Grade::A
    } else if score >= HP.grade_b_min {
        Grade::B
    } else if score >= HP.grade_c_min {
        Grade::C
    } else if score >= HP.grade_d_min {
        Grade::D
    } else {
        Grade::F
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

struct Findings {
    score: i32,
    issues: Vec<Issue>,
    suggestions: Vec<String>,
}

impl Findings {
    fn apply(&mut self, delta: i32) {
        self.score += delta;
    }

    fn issue(&mut self, kind: IssueKind, message: &str) {
        self.issues.push(Issue {
            kind,
            message: message.to_string(),
        });
    }

    fn suggest(&mut self, suggestion: &str) {
        self.suggestions.push(suggestion.to_string());
    }
}

pub fn analyze(text: &str) -> QualityResult {
    let tokens = tokens::estimate(text);
    let patterns = patterns::detect(text);
    let mut f = Findings {
        score: HP.base_score,
        issues: Vec::new(),
        suggestions: Vec::new(),
    };

    // Length
    if tokens < HP.short_prompt_tokens {
        f.apply(HP.short_prompt_penalty);
        f.issue(IssueKind::Error, "Prompt too short - add more context");
        f.suggest("Add background context and specific instructions");
    } else if tokens > HP.long_prompt_tokens {
        f.apply(HP.long_prompt_penalty);
        f.issue(IssueKind::Warning, "Prompt very long - consider simplifying");
        f.suggest("Break into smaller, focused prompts or use context management");
    }

    // Pattern bonuses
    let high = patterns
        .iter()
        .filter(|m| m.pattern.effectiveness.is_high())
        .count() as i32;
    f.apply(high * HP.high_pattern_bonus);

    if patterns.is_empty() {
        f.apply(HP.no_pattern_penalty);
        f.issue(IssueKind::Warning, "No recognized prompt patterns detected");
        f.suggest("Try adding \"Think step by step\" or provide examples");
    }

    if patterns::contains(&patterns, patterns::EMOTIONAL_APPEAL) {
        f.apply(HP.emotional_penalty);
        f.issue(
            IssueKind::Info,
            "Emotional language detected - typically ineffective",
        );
        f.suggest("Remove phrases like \"this is important\" - they don't improve output");
    }

    // Specificity
    let lower = text.to_lowercase();
    if HP.vague_words.iter().any(|w| lower.contains(w)) {
        f.apply(HP.vague_penalty);
        f.issue(IssueKind::Warning, "Vague language detected");
        f.suggest("Be specific: instead of \"help me\", say \"write a function that...\"");
    }

    if tokens > HP.structure_hint_tokens {
        if !patterns::contains(&patterns, patterns::ROLE_BASED) {
            f.apply(HP.missing_role_penalty);
            f.suggest("Consider adding a role: \"You are an expert...\"");
        }
        if !patterns::contains(&patterns, patterns::OUTPUT_FORMATTING) {
            f.suggest("Specify output format: \"Provide as markdown list\" or \"Return JSON\"");
        }
    }

    let score = f.score.clamp(HP.score_min, HP.score_max);
    let grade = grade_for_score(score);
    debug!(score, %grade, tokens, patterns = patterns.len(), "analyzed prompt quality");

    QualityResult {
        score,
        grade,
        tokens,
        estimated_cost: cost::estimate_prompt_cost(
            text,
            cost::DEFAULT_MODEL,
            cost::DEFAULT_OUTPUT_TOKENS,
        ),
        patterns,
        issues: f.issues,
        suggestions: f.suggestions,
    }
}

// ---------------------------------------------------------------------------
// Dimension scores
// ---------------------------------------------------------------------------

static ACTION_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(create|generate|write|analyze|explain|describe|design|build)\b").unwrap()
});
static HEDGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(maybe|might|could|perhaps|possibly|somewhat)\b").unwrap());
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(context|background|scenario|you are|act as)\b").unwrap());
static FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(format|output|structure)\b").unwrap());
static TONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(tone|style|voice)\b").unwrap());
static CONSTRAINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(constraints?|requirements?|must|should)\b").unwrap());
static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^}]+\}\}").unwrap());
static EXAMPLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(example|instance|such as)\b").unwrap());
static PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:.;]").unwrap());
static VAGUE_TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(thing|stuff|something|anything)\b").unwrap());
static NOVELTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(unique|creative|innovative|novel|original)\b").unwrap());
static MOOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(style|tone|mood|atmosphere|feeling)\b").unwrap());
static FIGURATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(metaphor|analogy|compare|contrast)\b").unwrap());

const DIMENSION_MAX: f64 = 10.0;

fn points(rules: &[(bool, f64)]) -> f64 {
    rules
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, p)| p)
        .sum::<f64>()
        .min(DIMENSION_MAX)
}

/// Score a prompt on five builder dimensions. `techniques_selected` is the
/// number of techniques the author explicitly picked for this prompt.
pub fn dimension_scores(prompt: &str, techniques_selected: usize) -> DimensionScores {
    let line_count = prompt.split('\n').count();
    let char_count = prompt.chars().count();
    let word_count = prompt.split_whitespace().count();
    let has_variables = VARIABLE_RE.is_match(prompt);

    let clarity = points(&[
        (ACTION_VERB_RE.is_match(prompt), 2.0),
        (char_count > 20, 2.0),
        (!HEDGE_RE.is_match(prompt), 2.0),
        (line_count > 1, 2.0),
        (DIGIT_RE.is_match(prompt), 1.0),
        (prompt.contains(':'), 1.0),
    ]);

    let coverage = points(&[
        (CONTEXT_RE.is_match(prompt), 2.0),
        (FORMAT_RE.is_match(prompt), 2.0),
        (TONE_RE.is_match(prompt), 2.0),
        (CONSTRAINT_RE.is_match(prompt), 2.0),
        (has_variables, 1.0),
        (EXAMPLE_RE.is_match(prompt), 1.0),
    ]);

    let effectiveness = points(&[
        ((10..=300).contains(&word_count), 3.0),
        (prompt.contains("{{") && prompt.contains("}}"), 2.0),
        (prompt.contains('\n'), 2.0),
        (PUNCTUATION_RE.is_match(prompt), 1.0),
        (!VAGUE_TERM_RE.is_match(prompt), 2.0),
    ]);

    let creativity = points(&[
        (has_variables, 2.0),
        (line_count >= 5, 2.0),
        (NOVELTY_RE.is_match(prompt), 1.0),
        (MOOD_RE.is_match(prompt), 2.0),
        (char_count > 100, 2.0),
        (FIGURATIVE_RE.is_match(prompt), 1.0),
    ]);

    let mut success = clarity * 0.3 + coverage * 0.3 + effectiveness * 0.2;
    if techniques_selected > 0 {
        success += 2.0;
    }

    DimensionScores {
        clarity,
        coverage,
        effectiveness,
        creativity,
        success: success.min(DIMENSION_MAX),
    }
}
