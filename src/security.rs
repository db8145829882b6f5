//! PII, prompt-injection and jailbreak screening.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::quality::Grade;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    PiiExposure,
    JailbreakAttempt,
    InjectionPattern,
    PermissionRequest,
    DataExfiltration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub message: String,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub score: i32,
    pub grade: Grade,
    pub issues: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub safe: bool,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sanitized {
    pub sanitized: String,
    pub changes_made: bool,
    pub removed_items: Vec<String>,
}

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

struct Hyperparameters {
    score_max: i32,
    high_penalty: i32,
    medium_penalty: i32,
    low_penalty: i32,
    grade_a_min: i32,
    grade_b_min: i32,
    grade_c_min: i32,
    grade_d_min: i32,
}

static HP: Hyperparameters = Hyperparameters {
    score_max: 100,
    high_penalty: 30,
    medium_penalty: 15,
    low_penalty: 5,
    grade_a_min: 90,
    grade_b_min: 75,
    grade_c_min: 60,
    grade_d_min: 40,
};

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap());
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").unwrap());
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(sk-|pk_live_|pk_test_)[a-zA-Z0-9]{20,}\b").unwrap());

/// PII families in reporting order.
static PII_PATTERNS: Lazy<Vec<(&'static str, &'static Regex)>> = Lazy::new(|| {
    vec![
        ("email", &*EMAIL_RE),
        ("phone", &*PHONE_RE),
        ("ssn", &*SSN_RE),
        ("credit card", &*CARD_RE),
        ("api key", &*API_KEY_RE),
    ]
});

/// Replacement order used by `sanitize`. Overlapping matches are not guarded.
static SANITIZE_ORDER: Lazy<Vec<(&'static Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (&*EMAIL_RE, "[EMAIL]"),
        (&*PHONE_RE, "[PHONE]"),
        (&*API_KEY_RE, "[API_KEY]"),
        (&*SSN_RE, "[SSN]"),
        (&*CARD_RE, "[CARD]"),
    ]
});

static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)ignore\s+(all\s+)?previous\s+instructions").unwrap(),
        Regex::new(r"(?i)disregard\s+(all\s+)?(previous|above)").unwrap(),
        Regex::new(r"(?i)forget\s+everything").unwrap(),
        Regex::new(r"(?i)new\s+instructions:").unwrap(),
        Regex::new(r"(?i)system:\s+you\s+are\s+now").unwrap(),
    ]
});

static JAILBREAK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)DAN mode").unwrap(),
        Regex::new(r"(?i)developer mode").unwrap(),
        Regex::new(r"(?i)bypass\s+(your\s+)?(safety|ethical|moral)").unwrap(),
        Regex::new(r"(?i)pretend\s+you\s+(have\s+)?no\s+(rules|restrictions)").unwrap(),
    ]
});

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\w+\]").unwrap());

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn finding(
    severity: Severity,
    kind: FindingKind,
    message: impl Into<String>,
    recommendation: &'static str,
) -> Finding {
    Finding {
        severity,
        kind,
        message: message.into(),
        recommendation,
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

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

fn count(findings: &[Finding], severity: Severity) -> i32 {
    findings.iter().filter(|f| f.severity == severity).count() as i32
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn scan(text: &str) -> SecurityReport {
    let lower = text.to_lowercase();
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    for (family, re) in PII_PATTERNS.iter() {
        if re.is_match(text) {
            issues.push(finding(
                Severity::High,
                FindingKind::PiiExposure,
                format!("Potential {family} detected in prompt"),
                "Remove sensitive data or use placeholders",
            ));
        }
    }

    for re in INJECTION_PATTERNS.iter() {
        if re.is_match(text) {
            warnings.push(finding(
                Severity::Medium,
                FindingKind::InjectionPattern,
                "Prompt contains potential injection pattern",
                "Review if this is intentional or user input",
            ));
        }
    }

    for re in JAILBREAK_PATTERNS.iter() {
        if re.is_match(text) {
            issues.push(finding(
                Severity::High,
                FindingKind::JailbreakAttempt,
                "Prompt contains potential jailbreak pattern",
                "Remove or rephrase this section",
            ));
        }
    }

    if lower.contains("access") && contains_any(&lower, &["file", "system"]) {
        warnings.push(finding(
            Severity::Low,
            FindingKind::PermissionRequest,
            "Prompt requests file/system access",
            "Ensure this is necessary and safe",
        ));
    }

    if contains_any(&lower, &["send", "post"]) && contains_any(&lower, &["url", "http", "api"]) {
        warnings.push(finding(
            Severity::Medium,
            FindingKind::DataExfiltration,
            "Prompt may attempt to send data externally",
            "Verify external endpoints are trusted",
        ));
    }

    let score = (HP.score_max
        - count(&issues, Severity::High) * HP.high_penalty
        - count(&warnings, Severity::Medium) * HP.medium_penalty
        - count(&warnings, Severity::Low) * HP.low_penalty)
        .max(0);

    let recommendation = if !issues.is_empty() {
        "Review and fix security issues before using"
    } else if !warnings.is_empty() {
        "Consider addressing warnings"
    } else {
        "Prompt appears safe"
    };

    debug!(
        score,
        issues = issues.len(),
        warnings = warnings.len(),
        "scanned prompt"
    );

    SecurityReport {
        score,
        grade: grade_for_score(score),
        safe: issues.is_empty(),
        issues,
        warnings,
        recommendation,
    }
}

/// Replace every PII occurrence with a bracketed placeholder.
pub fn sanitize(text: &str) -> Sanitized {
    let mut sanitized = text.to_string();
    for (re, placeholder) in SANITIZE_ORDER.iter() {
        sanitized = re.replace_all(&sanitized, *placeholder).into_owned();
    }
    let removed_items = PLACEHOLDER_RE
        .find_iter(&sanitized)
        .map(|m| m.as_str().to_string())
        .collect();
    Sanitized {
        changes_made: sanitized != text,
        sanitized,
        removed_items,
    }
}
