use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Effectiveness {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Effectiveness {
    pub fn is_high(self) -> bool {
        matches!(self, Effectiveness::High | Effectiveness::VeryHigh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// A catalog entry describing one prompt-engineering technique.
#[derive(Debug, Serialize)]
pub struct Pattern {
    pub id: &'static str,
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    #[serde(skip)]
    pub regex: &'static str,
    pub description: &'static str,
    pub effectiveness: Effectiveness,
    pub when_to_use: &'static str,
}

/// A catalog entry detected in a specific prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    #[serde(flatten)]
    pub pattern: &'static Pattern,
    pub confidence: Confidence,
}

impl PatternMatch {
    pub fn id(&self) -> &'static str {
        self.pattern.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskType {
    #[default]
    General,
    Code,
    Reasoning,
    Writing,
    Analysis,
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(TaskType::General),
            "code" => Ok(TaskType::Code),
            "reasoning" => Ok(TaskType::Reasoning),
            "writing" => Ok(TaskType::Writing),
            "analysis" => Ok(TaskType::Analysis),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::General => "general",
            TaskType::Code => "code",
            TaskType::Reasoning => "reasoning",
            TaskType::Writing => "writing",
            TaskType::Analysis => "analysis",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub detected: Vec<PatternMatch>,
    pub missing: Vec<&'static Pattern>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub const CHAIN_OF_THOUGHT: &str = "chain-of-thought";
pub const ROLE_BASED: &str = "role-based";
pub const FEW_SHOT: &str = "few-shot";
pub const OUTPUT_FORMATTING: &str = "output-formatting";
pub const EMOTIONAL_APPEAL: &str = "emotional-appeal";

pub static CATALOG: &[Pattern] = &[
    Pattern {
        id: CHAIN_OF_THOUGHT,
        name: "Chain of Thought",
        keywords: &["think step by step", "let's think", "reasoning", "step by step"],
        regex: r"(?i)think\s+step\s+by\s+step|let'?s\s+think|reason(?:ing)?\s+through",
        description: "Encourages detailed reasoning process",
        effectiveness: Effectiveness::High,
        when_to_use: "Complex reasoning, math, logic problems",
    },
    Pattern {
        id: ROLE_BASED,
        name: "Role-Based",
        keywords: &["you are", "act as", "expert", "specialist"],
        regex: r"(?i)you\s+are\s+(?:a|an)\s+(?:[\w\s]+\s)?(?:expert|specialist|professional)|act\s+as",
        description: "Assigns specific expertise/persona",
        effectiveness: Effectiveness::High,
        when_to_use: "Specialized tasks, domain knowledge needed",
    },
    Pattern {
        id: FEW_SHOT,
        name: "Few-Shot Learning",
        keywords: &["example:", "for instance", "input:", "output:"],
        regex: r"(?i)(?:example|input|output)\s*:\s*[\s\S]{10,}",
        description: "Provides examples to guide behavior",
        effectiveness: Effectiveness::VeryHigh,
        when_to_use: "Format specification, style matching",
    },
    Pattern {
        id: "constraint-based",
        name: "Constraint-Based",
        keywords: &["must", "should", "do not", "never", "always", "requirements:"],
        regex: r"(?i)(?:must|should|do\s+not|never|always|requirements?)[\s:]",
        description: "Sets explicit boundaries/rules",
        effectiveness: Effectiveness::Medium,
        when_to_use: "Need specific format or boundaries",
    },
    Pattern {
        id: "context-stuffing",
        name: "Context Stuffing",
        keywords: &["background:", "context:", "given that", "considering"],
        regex: r"(?i)(?:background|context|given\s+that|considering)[\s:]",
        description: "Provides extensive background info",
        effectiveness: Effectiveness::Medium,
        when_to_use: "Complex domain requiring context",
    },
    Pattern {
        id: OUTPUT_FORMATTING,
        name: "Output Formatting",
        keywords: &["format:", "structure:", "json", "markdown", "bullet points"],
        regex: r"(?i)(?:format|structure|output)\s*:\s*(?:json|markdown|yaml|xml|bullet|numbered)",
        description: "Specifies desired output structure",
        effectiveness: Effectiveness::High,
        when_to_use: "Structured data needed",
    },
    Pattern {
        id: "meta-prompting",
        name: "Meta-Prompting",
        keywords: &["critique", "improve", "iterate", "refine"],
        regex: r"(?i)(?:critique|improve|iterate|refine)\s+(?:your|this|the)\s+(?:answer|response|output)",
        description: "AI evaluates and improves own output",
        effectiveness: Effectiveness::VeryHigh,
        when_to_use: "Quality matters more than speed",
    },
    Pattern {
        id: "tree-of-thought",
        name: "Tree of Thought",
        keywords: &["explore", "alternatives", "consider multiple", "different approaches"],
        regex: r"(?i)(?:explore|consider)\s+(?:multiple|different|various|alternative)\s+(?:approaches|paths|solutions)",
        description: "Explores multiple solution paths",
        effectiveness: Effectiveness::High,
        when_to_use: "Complex problems with multiple solutions",
    },
    Pattern {
        id: "self-consistency",
        name: "Self-Consistency",
        keywords: &["multiple times", "various ways", "check consistency"],
        regex: r"(?i)multiple\s+times|various\s+ways|check\s+consistency",
        description: "Generates multiple answers, picks most consistent",
        effectiveness: Effectiveness::High,
        when_to_use: "High-stakes decisions",
    },
    Pattern {
        id: EMOTIONAL_APPEAL,
        name: "Emotional/Urgency",
        keywords: &["important", "critical", "urgent", "please"],
        regex: r"(?i)(?:very\s+)?(?:important|critical|urgent|crucial)",
        description: "Adds urgency/importance (low effectiveness)",
        effectiveness: Effectiveness::Low,
        when_to_use: "Generally avoid - doesn't improve output",
    },
];

/// Compiled regexes, index-aligned with `CATALOG`.
static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    CATALOG
        .iter()
        .map(|p| Regex::new(p.regex).unwrap())
        .collect()
});

pub fn find(id: &str) -> Option<&'static Pattern> {
    CATALOG.iter().find(|p| p.id == id)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Detect catalog patterns in `text`, in catalog order, each at most once.
pub fn detect(text: &str) -> Vec<PatternMatch> {
    let lower = text.to_lowercase();
    CATALOG
        .iter()
        .zip(COMPILED.iter())
        .filter_map(|(pattern, re)| {
            if re.is_match(text) {
                Some(PatternMatch {
                    pattern,
                    confidence: Confidence::High,
                })
            } else if pattern.keywords.iter().any(|kw| lower.contains(kw)) {
                Some(PatternMatch {
                    pattern,
                    confidence: Confidence::Medium,
                })
            } else {
                None
            }
        })
        .collect()
}

pub fn contains(matches: &[PatternMatch], id: &str) -> bool {
    matches.iter().any(|m| m.id() == id)
}

/// Detected patterns plus the ones a task of this type usually benefits from.
pub fn recommendations(text: &str, task: TaskType) -> Recommendations {
    let detected = detect(text);
    let wanted: &[&str] = match task {
        TaskType::Code => &[FEW_SHOT, OUTPUT_FORMATTING],
        TaskType::Reasoning => &[CHAIN_OF_THOUGHT],
        _ => &[],
    };
    let missing = wanted
        .iter()
        .filter(|id| !contains(&detected, id))
        .filter_map(|id| find(id))
        .collect();
    Recommendations { detected, missing }
}
