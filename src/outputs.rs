//! Model outputs recorded against saved prompts.
//!
//! Each prompt keeps its most recent outputs, capped at
//! [`MAX_OUTPUTS_PER_PROMPT`]. Outputs can be rated, compared pairwise,
//! summarised per model and exported for sharing.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{self, KeyValueStore};
use crate::tokens;

pub const MAX_OUTPUTS_PER_PROMPT: usize = 20;
pub const STORAGE_KEY: &str = "prompt_outputs";
const UNKNOWN_MODEL: &str = "unknown";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: usize,
    pub output: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutput {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub output: String,
    pub model: String,
    pub tokens: TokenUsage,
    /// Total spend in USD, when known.
    pub cost: Option<f64>,
    /// User rating from 1 to 5.
    pub quality: Option<u8>,
    pub prompt_version: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A model response to record. Token counts are estimated when absent.
#[derive(Debug, Clone, Default)]
pub struct NewOutput {
    pub text: String,
    pub prompt: String,
    pub model: Option<String>,
    pub input_tokens: Option<usize>,
    pub output_tokens: Option<usize>,
    pub cost: Option<f64>,
    pub quality: Option<u8>,
    pub prompt_version: Option<usize>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pick {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountDelta {
    pub first: usize,
    pub second: usize,
    pub diff: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostDelta {
    pub first: f64,
    pub second: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputComparison {
    pub first: StoredOutput,
    pub second: StoredOutput,
    pub length: CountDelta,
    pub tokens: CountDelta,
    pub cost: CostDelta,
    /// Only set when both outputs are rated.
    pub recommendation: Option<Pick>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub count: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputStats {
    pub total_outputs: usize,
    pub total_cost: f64,
    pub total_tokens: usize,
    pub avg_quality: Option<f64>,
    pub avg_output_length: usize,
    pub model_breakdown: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

/// Outputs keyed by prompt id, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputLog {
    outputs: BTreeMap<String, Vec<StoredOutput>>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn check_quality(quality: Option<u8>) -> Result<()> {
    match quality {
        Some(q) if !(1..=5).contains(&q) => {
            Err(Error::invalid("quality", format!("{q} is outside 1-5")))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<K: KeyValueStore>(store: &K) -> Result<Self> {
        storage::load_value(store, STORAGE_KEY)
    }

    pub fn save<K: KeyValueStore>(&self, store: &mut K) -> Result<()> {
        storage::save_value(store, STORAGE_KEY, self)
    }

    /// Record an output and return its id. Only the newest
    /// [`MAX_OUTPUTS_PER_PROMPT`] outputs per prompt are kept.
    pub fn store(&mut self, prompt_id: &str, new: NewOutput) -> Result<String> {
        check_quality(new.quality)?;
        let entry = StoredOutput {
            id: format!("output_{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            tokens: TokenUsage {
                input: new
                    .input_tokens
                    .unwrap_or_else(|| tokens::estimate(&new.prompt)),
                output: new
                    .output_tokens
                    .unwrap_or_else(|| tokens::estimate(&new.text)),
            },
            output: new.text,
            model: new.model.unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            cost: new.cost,
            quality: new.quality,
            prompt_version: new.prompt_version.unwrap_or(1),
            metadata: new.metadata,
        };
        let id = entry.id.clone();

        let list = self.outputs.entry(prompt_id.to_string()).or_default();
        list.push(entry);
        if list.len() > MAX_OUTPUTS_PER_PROMPT {
            let excess = list.len() - MAX_OUTPUTS_PER_PROMPT;
            list.drain(..excess);
        }
        debug!(prompt = prompt_id, output = %id, kept = list.len(), "stored output");
        Ok(id)
    }

    pub fn outputs(&self, prompt_id: &str) -> &[StoredOutput] {
        self.outputs.get(prompt_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn output(&self, prompt_id: &str, output_id: &str) -> Result<&StoredOutput> {
        self.outputs(prompt_id)
            .iter()
            .find(|o| o.id == output_id)
            .ok_or_else(|| Error::not_found("output", output_id))
    }

    pub fn rate(&mut self, prompt_id: &str, output_id: &str, quality: u8) -> Result<()> {
        check_quality(Some(quality))?;
        let output = self
            .outputs
            .get_mut(prompt_id)
            .and_then(|list| list.iter_mut().find(|o| o.id == output_id))
            .ok_or_else(|| Error::not_found("output", output_id))?;
        output.quality = Some(quality);
        Ok(())
    }

    /// Drop every output recorded for a prompt, e.g. when it is purged.
    pub fn forget(&mut self, prompt_id: &str) -> usize {
        self.outputs.remove(prompt_id).map_or(0, |list| list.len())
    }

    /// Side-by-side numbers for two outputs. With equal ratings the cheaper
    /// one is recommended.
    pub fn compare(&self, prompt_id: &str, first: &str, second: &str) -> Result<OutputComparison> {
        let a = self.output(prompt_id, first)?;
        let b = self.output(prompt_id, second)?;

        let len_a = a.output.chars().count();
        let len_b = b.output.chars().count();
        let cost_a = a.cost.unwrap_or(0.0);
        let cost_b = b.cost.unwrap_or(0.0);

        let recommendation = match (a.quality, b.quality) {
            (Some(qa), Some(qb)) if qa > qb => Some(Pick::First),
            (Some(qa), Some(qb)) if qb > qa => Some(Pick::Second),
            (Some(_), Some(_)) => match (a.cost, b.cost) {
                (Some(ca), Some(cb)) if ca < cb => Some(Pick::First),
                _ => Some(Pick::Second),
            },
            _ => None,
        };

        Ok(OutputComparison {
            length: CountDelta {
                first: len_a,
                second: len_b,
                diff: len_a.abs_diff(len_b),
            },
            tokens: CountDelta {
                first: a.tokens.output,
                second: b.tokens.output,
                diff: a.tokens.output.abs_diff(b.tokens.output),
            },
            cost: CostDelta {
                first: cost_a,
                second: cost_b,
                savings: (cost_a - cost_b).abs(),
            },
            recommendation,
            first: a.clone(),
            second: b.clone(),
        })
    }

    /// Totals for a prompt, or `None` when nothing was recorded.
    pub fn stats(&self, prompt_id: &str) -> Option<OutputStats> {
        let outputs = self.outputs(prompt_id);
        if outputs.is_empty() {
            return None;
        }

        let total_cost: f64 = outputs.iter().filter_map(|o| o.cost).sum();
        let rated: Vec<f64> = outputs
            .iter()
            .filter_map(|o| o.quality.map(f64::from))
            .collect();
        let avg_quality =
            (!rated.is_empty()).then(|| round_to(rated.iter().sum::<f64>() / rated.len() as f64, 1));
        let total_chars: usize = outputs.iter().map(|o| o.output.chars().count()).sum();

        let mut model_breakdown: BTreeMap<String, ModelUsage> = BTreeMap::new();
        for output in outputs {
            let usage = model_breakdown.entry(output.model.clone()).or_default();
            usage.count += 1;
            usage.cost += output.cost.unwrap_or(0.0);
        }

        Some(OutputStats {
            total_outputs: outputs.len(),
            total_cost: round_to(total_cost, 4),
            total_tokens: outputs.iter().map(|o| o.tokens.output).sum(),
            avg_quality,
            avg_output_length: (total_chars as f64 / outputs.len() as f64).round() as usize,
            model_breakdown,
        })
    }

    pub fn export(&self, prompt_id: &str, format: ExportFormat) -> Result<String> {
        let outputs = self.outputs(prompt_id);
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(outputs)?),
            ExportFormat::Csv => Ok(export_csv(outputs)),
            ExportFormat::Markdown => Ok(export_markdown(outputs)),
        }
    }
}

fn export_csv(outputs: &[StoredOutput]) -> String {
    let mut lines = vec!["Timestamp,Model,Quality,Tokens,Cost,Output".to_string()];
    for o in outputs {
        lines.push(format!(
            "{},{},{},{},{},\"{}\"",
            o.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            o.model,
            o.quality.map(|q| q.to_string()).unwrap_or_default(),
            o.tokens.output,
            o.cost.map(|c| format!("{c:.4}")).unwrap_or_default(),
            o.output.replace('"', "\"\""),
        ));
    }
    lines.join("\n")
}

fn export_markdown(outputs: &[StoredOutput]) -> String {
    let mut md = String::from("# Outputs\n\n");
    for (i, o) in outputs.iter().enumerate() {
        md.push_str(&format!(
            "## Output {} ({})\n\n",
            i + 1,
            o.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!("**Model:** {}\n", o.model));
        md.push_str(&format!("**Tokens:** {}\n", o.tokens.output));
        if let Some(q) = o.quality {
            md.push_str(&format!("**Quality:** {q}/5\n"));
        }
        md.push_str(&format!("\n{}\n\n---\n\n", o.output));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn output(text: &str, model: &str, cost: Option<f64>, quality: Option<u8>) -> NewOutput {
        NewOutput {
            text: text.into(),
            prompt: "Explain lifetimes".into(),
            model: Some(model.into()),
            cost,
            quality,
            ..NewOutput::default()
        }
    }

    #[test]
    fn keeps_the_newest_twenty() {
        let mut log = OutputLog::new();
        let mut ids = Vec::new();
        for i in 0..25 {
            ids.push(log.store("p1", output(&format!("answer {i}"), "gpt-4", None, None)).unwrap());
        }
        let kept = log.outputs("p1");
        assert_eq!(kept.len(), MAX_OUTPUTS_PER_PROMPT);
        assert_eq!(kept[0].id, ids[5]);
        assert_eq!(kept.last().unwrap().output, "answer 24");
        assert!(log.outputs("other").is_empty());
    }

    #[test]
    fn estimates_missing_token_counts() {
        let mut log = OutputLog::new();
        let id = log
            .store(
                "p1",
                NewOutput {
                    text: "x".repeat(40),
                    prompt: "y".repeat(8),
                    ..NewOutput::default()
                },
            )
            .unwrap();
        let stored = log.output("p1", &id).unwrap();
        assert_eq!(stored.tokens, TokenUsage { input: 2, output: 10 });
        assert_eq!(stored.model, UNKNOWN_MODEL);
        assert_eq!(stored.prompt_version, 1);
    }

    #[test]
    fn rejects_out_of_range_ratings() {
        let mut log = OutputLog::new();
        assert!(log.store("p1", output("a", "m", None, Some(6))).is_err());
        let id = log.store("p1", output("a", "m", None, None)).unwrap();
        assert!(matches!(log.rate("p1", &id, 0), Err(Error::Validation { .. })));
        log.rate("p1", &id, 4).unwrap();
        assert_eq!(log.outputs("p1")[0].quality, Some(4));
    }

    #[test]
    fn comparison_prefers_rating_then_cost() {
        let mut log = OutputLog::new();
        let a = log.store("p1", output("short", "gpt-4", Some(0.02), Some(4))).unwrap();
        let b = log.store("p1", output("a longer reply", "claude-haiku", Some(0.01), Some(4))).unwrap();
        let c = log.store("p1", output("unrated", "gpt-4", None, None)).unwrap();

        let cmp = log.compare("p1", &a, &b).unwrap();
        assert_eq!(cmp.recommendation, Some(Pick::Second));
        assert_eq!(cmp.length.diff, 9);
        assert!((cmp.cost.savings - 0.01).abs() < 1e-12);

        log.rate("p1", &a, 5).unwrap();
        assert_eq!(log.compare("p1", &a, &b).unwrap().recommendation, Some(Pick::First));
        assert_eq!(log.compare("p1", &a, &c).unwrap().recommendation, None);
        assert!(matches!(
            log.compare("p1", &a, "missing"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn stats_break_down_by_model() {
        let mut log = OutputLog::new();
        assert!(log.stats("p1").is_none());
        log.store("p1", output("abcd", "gpt-4", Some(0.03), Some(5))).unwrap();
        log.store("p1", output("ab", "gpt-4", Some(0.01), None)).unwrap();
        log.store("p1", output("abcdef", "claude-haiku", None, Some(2))).unwrap();

        let stats = log.stats("p1").unwrap();
        assert_eq!(stats.total_outputs, 3);
        assert_eq!(stats.total_cost, 0.04);
        assert_eq!(stats.avg_quality, Some(3.5));
        assert_eq!(stats.avg_output_length, 4);
        assert_eq!(stats.model_breakdown["gpt-4"].count, 2);
        assert_eq!(stats.model_breakdown["claude-haiku"].cost, 0.0);
    }

    #[test]
    fn exports_csv_and_markdown() {
        let mut log = OutputLog::new();
        log.store("p1", output("say \"hi\"", "gpt-4", Some(0.5), Some(3))).unwrap();
        log.store("p1", output("plain", "gpt-4", None, None)).unwrap();

        let csv = log.export("p1", ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Timestamp,Model,Quality,Tokens,Cost,Output");
        assert!(lines[1].ends_with(",gpt-4,3,2,0.5000,\"say \"\"hi\"\"\""), "{}", lines[1]);
        assert!(lines[2].contains(",gpt-4,,"));

        let md = log.export("p1", ExportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Outputs\n\n## Output 1 ("));
        assert_eq!(md.matches("**Quality:**").count(), 1);

        let json: Value = serde_json::from_str(&log.export("p1", ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
    }

    #[test]
    fn persists_through_a_store() {
        let mut log = OutputLog::new();
        log.store("p1", output("hello", "gpt-4", None, Some(5))).unwrap();
        let mut store = MemoryStore::new("local");
        log.save(&mut store).unwrap();
        assert_eq!(OutputLog::load(&store).unwrap(), log);
        assert_eq!(OutputLog::load(&MemoryStore::new("local")).unwrap(), OutputLog::new());
    }
}
