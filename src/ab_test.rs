//! A/B tests between prompt variants.
//!
//! A test collects user-rated results per variant and completes once every
//! variant reaches the target sample size. The winner is the variant with
//! the best average rating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::assistant::Variation;
use crate::error::{Error, Result};
use crate::storage::{self, KeyValueStore};

pub const DEFAULT_SAMPLE_SIZE: usize = 10;
pub const STORAGE_KEY: &str = "ab_tests";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Active,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnerConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub timestamp: DateTime<Utc>,
    /// User rating from 1 to 5.
    pub quality: u8,
    pub cost: Option<f64>,
    pub tokens: Option<usize>,
    pub time_to_complete_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NewResult {
    pub quality: u8,
    pub cost: Option<f64>,
    pub tokens: Option<usize>,
    pub time_to_complete_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub results: Vec<TrialResult>,
}

#[derive(Debug, Clone)]
pub struct VariantSpec {
    pub name: String,
    pub prompt: String,
}

impl From<&Variation> for VariantSpec {
    fn from(v: &Variation) -> Self {
        Self {
            name: v.name.to_string(),
            prompt: v.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    pub id: String,
    pub name: String,
    pub prompt_id: Option<String>,
    pub variants: Vec<Variant>,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    pub target_sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSummary {
    pub variant_id: String,
    pub name: String,
    pub sample_size: usize,
    /// Mean rating, two decimals.
    pub avg_quality: Option<f64>,
    pub avg_cost: Option<f64>,
    pub avg_tokens: Option<usize>,
    /// Mean rating scaled to 0-100.
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestAnalysis {
    pub test_id: String,
    pub name: String,
    pub status: TestStatus,
    pub variants: Vec<VariantSummary>,
    pub winner: Option<VariantSummary>,
    /// Needs at least two variants with results.
    pub confidence: Option<WinnerConfidence>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbTests {
    tests: Vec<AbTest>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    values.sum::<f64>() / n as f64
}

fn summarize(variant: &Variant) -> VariantSummary {
    let results = &variant.results;
    let n = results.len();
    let mut summary = VariantSummary {
        variant_id: variant.id.clone(),
        name: variant.name.clone(),
        sample_size: n,
        avg_quality: None,
        avg_cost: None,
        avg_tokens: None,
        quality_score: None,
    };
    if n == 0 {
        return summary;
    }
    let quality = mean(results.iter().map(|r| f64::from(r.quality)), n);
    summary.avg_quality = Some(round_to(quality, 2));
    summary.avg_cost = Some(round_to(
        mean(results.iter().map(|r| r.cost.unwrap_or(0.0)), n),
        4,
    ));
    summary.avg_tokens =
        Some(mean(results.iter().map(|r| r.tokens.unwrap_or(0) as f64), n).round() as usize);
    summary.quality_score = Some(quality * 20.0);
    summary
}

fn confidence_for(gap: f64) -> WinnerConfidence {
    if gap > 1.0 {
        WinnerConfidence::High
    } else if gap > 0.5 {
        WinnerConfidence::Medium
    } else {
        WinnerConfidence::Low
    }
}

// ---------------------------------------------------------------------------
// Tests collection
// ---------------------------------------------------------------------------

impl AbTests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<K: KeyValueStore>(store: &K) -> Result<Self> {
        storage::load_value(store, STORAGE_KEY)
    }

    pub fn save<K: KeyValueStore>(&self, store: &mut K) -> Result<()> {
        storage::save_value(store, STORAGE_KEY, self)
    }

    pub fn tests(&self) -> &[AbTest] {
        &self.tests
    }

    pub fn test(&self, id: &str) -> Result<&AbTest> {
        self.tests
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found("test", id))
    }

    /// Start a test over at least two variants. A target of zero or `None`
    /// uses [`DEFAULT_SAMPLE_SIZE`].
    pub fn create(
        &mut self,
        name: &str,
        prompt_id: Option<&str>,
        variants: Vec<VariantSpec>,
        target_sample_size: Option<usize>,
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("name", "must not be empty"));
        }
        if variants.len() < 2 {
            return Err(Error::invalid("variants", "an A/B test needs two or more"));
        }

        let id = format!("test_{}", Uuid::new_v4().simple());
        self.tests.push(AbTest {
            id: id.clone(),
            name: name.to_string(),
            prompt_id: prompt_id.map(str::to_string),
            variants: variants
                .into_iter()
                .enumerate()
                .map(|(i, spec)| Variant {
                    id: format!("variant_{i}"),
                    name: spec.name,
                    prompt: spec.prompt,
                    results: Vec::new(),
                })
                .collect(),
            status: TestStatus::Active,
            created_at: Utc::now(),
            target_sample_size: target_sample_size
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_SAMPLE_SIZE),
        });
        info!(test = %id, "created A/B test");
        Ok(id)
    }

    /// Add a rated result and return the test's status afterwards.
    pub fn record(&mut self, test_id: &str, variant_id: &str, result: NewResult) -> Result<TestStatus> {
        if !(1..=5).contains(&result.quality) {
            return Err(Error::invalid(
                "quality",
                format!("{} is outside 1-5", result.quality),
            ));
        }
        let test = self
            .tests
            .iter_mut()
            .find(|t| t.id == test_id)
            .ok_or_else(|| Error::not_found("test", test_id))?;
        let variant = test
            .variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or_else(|| Error::not_found("variant", variant_id))?;
        variant.results.push(TrialResult {
            timestamp: Utc::now(),
            quality: result.quality,
            cost: result.cost,
            tokens: result.tokens,
            time_to_complete_ms: result.time_to_complete_ms,
        });

        let target = test.target_sample_size;
        if test.status == TestStatus::Active
            && test.variants.iter().all(|v| v.results.len() >= target)
        {
            test.status = TestStatus::Complete;
            info!(test = %test.id, "A/B test reached its sample size");
        }
        Ok(test.status)
    }

    pub fn analyze(&self, test_id: &str) -> Result<TestAnalysis> {
        let test = self.test(test_id)?;
        let variants: Vec<VariantSummary> = test.variants.iter().map(summarize).collect();

        let mut ranked: Vec<&VariantSummary> =
            variants.iter().filter(|v| v.sample_size > 0).collect();
        // Stable: equal averages keep variant order.
        ranked.sort_by(|a, b| {
            b.avg_quality
                .unwrap_or(0.0)
                .total_cmp(&a.avg_quality.unwrap_or(0.0))
        });
        let winner = ranked.first().map(|v| (*v).clone());
        let confidence = match ranked.as_slice() {
            [best, second, ..] => Some(confidence_for(
                best.avg_quality.unwrap_or(0.0) - second.avg_quality.unwrap_or(0.0),
            )),
            _ => None,
        };

        Ok(TestAnalysis {
            test_id: test.id.clone(),
            name: test.name.clone(),
            status: test.status,
            variants,
            winner,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant;
    use crate::storage::MemoryStore;

    fn specs(n: usize) -> Vec<VariantSpec> {
        (0..n)
            .map(|i| VariantSpec {
                name: format!("Variant {i}"),
                prompt: format!("Prompt {i}"),
            })
            .collect()
    }

    fn rated(quality: u8) -> NewResult {
        NewResult {
            quality,
            cost: Some(0.01),
            tokens: Some(100),
            ..NewResult::default()
        }
    }

    #[test]
    fn needs_a_name_and_two_variants() {
        let mut tests = AbTests::new();
        assert!(tests.create(" ", None, specs(2), None).is_err());
        assert!(tests.create("Tone", None, specs(1), None).is_err());
        let id = tests.create("Tone", Some("p1"), specs(2), Some(0)).unwrap();
        let test = tests.test(&id).unwrap();
        assert_eq!(test.target_sample_size, DEFAULT_SAMPLE_SIZE);
        assert_eq!(test.variants[1].id, "variant_1");
        assert_eq!(test.status, TestStatus::Active);
    }

    #[test]
    fn completes_when_every_variant_has_enough_results() {
        let mut tests = AbTests::new();
        let id = tests.create("Tone", None, specs(2), Some(2)).unwrap();
        assert_eq!(tests.record(&id, "variant_0", rated(4)).unwrap(), TestStatus::Active);
        assert_eq!(tests.record(&id, "variant_0", rated(4)).unwrap(), TestStatus::Active);
        assert_eq!(tests.record(&id, "variant_1", rated(3)).unwrap(), TestStatus::Active);
        assert_eq!(tests.record(&id, "variant_1", rated(3)).unwrap(), TestStatus::Complete);
    }

    #[test]
    fn rejects_unknown_ids_and_bad_ratings() {
        let mut tests = AbTests::new();
        let id = tests.create("Tone", None, specs(2), None).unwrap();
        assert!(matches!(
            tests.record("nope", "variant_0", rated(3)),
            Err(Error::NotFound { kind: "test", .. })
        ));
        assert!(matches!(
            tests.record(&id, "variant_9", rated(3)),
            Err(Error::NotFound { kind: "variant", .. })
        ));
        assert!(matches!(
            tests.record(&id, "variant_0", rated(0)),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn winner_and_confidence() {
        let mut tests = AbTests::new();
        let id = tests.create("Tone", None, specs(3), None).unwrap();
        for q in [5, 4] {
            tests.record(&id, "variant_1", rated(q)).unwrap();
        }
        tests.record(&id, "variant_2", rated(2)).unwrap();

        let analysis = tests.analyze(&id).unwrap();
        assert_eq!(analysis.variants[0].sample_size, 0);
        assert_eq!(analysis.variants[0].avg_quality, None);
        let winner = analysis.winner.unwrap();
        assert_eq!(winner.variant_id, "variant_1");
        assert_eq!(winner.avg_quality, Some(4.5));
        assert_eq!(winner.quality_score, Some(90.0));
        assert_eq!(winner.avg_tokens, Some(100));
        assert_eq!(analysis.confidence, Some(WinnerConfidence::High));
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(confidence_for(1.5), WinnerConfidence::High);
        assert_eq!(confidence_for(1.0), WinnerConfidence::Medium);
        assert_eq!(confidence_for(0.5), WinnerConfidence::Low);
    }

    #[test]
    fn single_rated_variant_has_no_confidence() {
        let mut tests = AbTests::new();
        let id = tests.create("Tone", None, specs(2), None).unwrap();
        tests.record(&id, "variant_0", rated(3)).unwrap();
        let analysis = tests.analyze(&id).unwrap();
        assert_eq!(analysis.winner.unwrap().variant_id, "variant_0");
        assert_eq!(analysis.confidence, None);
    }

    #[test]
    fn variants_come_from_prompt_variations() {
        let specs: Vec<VariantSpec> = assistant::variations("Explain monads", 2)
            .iter()
            .map(VariantSpec::from)
            .collect();
        let mut tests = AbTests::new();
        let id = tests.create("Monads", None, specs, None).unwrap();
        assert_eq!(tests.test(&id).unwrap().variants[0].name, "With Chain-of-Thought");

        let mut store = MemoryStore::new("local");
        tests.save(&mut store).unwrap();
        assert_eq!(AbTests::load(&store).unwrap(), tests);
    }
}
