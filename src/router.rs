//! Model selection by task, priority and budget.

use serde::Serialize;

use crate::cost::{self, DEFAULT_OUTPUT_TOKENS};
use crate::patterns::TaskType;
use crate::tokens;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Speed {
    Slow,
    Medium,
    Fast,
    VeryFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    pub strengths: &'static [&'static str],
    pub speed: Speed,
    pub cost: CostTier,
    pub max_tokens: usize,
    pub quality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePriority {
    Speed,
    Quality,
    Cost,
    #[default]
    Balanced,
}

impl std::str::FromStr for RoutePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(RoutePriority::Speed),
            "quality" => Ok(RoutePriority::Quality),
            "cost" => Ok(RoutePriority::Cost),
            "balanced" => Ok(RoutePriority::Balanced),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

impl RoutePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutePriority::Speed => "speed",
            RoutePriority::Quality => "quality",
            RoutePriority::Cost => "cost",
            RoutePriority::Balanced => "balanced",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub task: TaskType,
    pub priority: RoutePriority,
    /// Skips scoring entirely when set.
    pub user_preference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredModel {
    pub model: &'static str,
    pub score: f64,
    pub estimated_cost: f64,
    pub quality: u32,
    pub speed: Speed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteDecision {
    pub model: String,
    pub reason: String,
    pub estimated_cost: Option<f64>,
    pub quality: Option<u32>,
    pub alternatives: Vec<ScoredModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostComparison {
    pub model: &'static str,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub quality: u32,
    pub speed: Speed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BudgetDecision {
    Affordable {
        model: &'static str,
        cost: f64,
        quality: u32,
        reason: String,
        savings: f64,
    },
    OverBudget {
        cheapest: CostComparison,
        shortfall: f64,
    },
}

// ---------------------------------------------------------------------------
// Catalog and weights
// ---------------------------------------------------------------------------

pub static MODELS: &[ModelProfile] = &[
    ModelProfile {
        name: "claude-sonnet-4",
        strengths: &["reasoning", "code", "analysis", "long-context"],
        speed: Speed::Medium,
        cost: CostTier::High,
        max_tokens: 200_000,
        quality: 95,
    },
    ModelProfile {
        name: "claude-sonnet-3.5",
        strengths: &["reasoning", "code", "analysis"],
        speed: Speed::Medium,
        cost: CostTier::High,
        max_tokens: 200_000,
        quality: 93,
    },
    ModelProfile {
        name: "claude-haiku",
        strengths: &["speed", "simple-tasks", "classification"],
        speed: Speed::VeryFast,
        cost: CostTier::VeryLow,
        max_tokens: 200_000,
        quality: 75,
    },
    ModelProfile {
        name: "gpt-4",
        strengths: &["reasoning", "creative", "complex"],
        speed: Speed::Slow,
        cost: CostTier::VeryHigh,
        max_tokens: 8192,
        quality: 92,
    },
    ModelProfile {
        name: "gpt-4-turbo",
        strengths: &["reasoning", "code", "analysis"],
        speed: Speed::Medium,
        cost: CostTier::High,
        max_tokens: 128_000,
        quality: 90,
    },
    ModelProfile {
        name: "gpt-4o",
        strengths: &["balanced", "multimodal"],
        speed: Speed::Fast,
        cost: CostTier::Medium,
        max_tokens: 128_000,
        quality: 88,
    },
    ModelProfile {
        name: "gpt-4o-mini",
        strengths: &["speed", "simple-tasks", "cost"],
        speed: Speed::VeryFast,
        cost: CostTier::VeryLow,
        max_tokens: 128_000,
        quality: 78,
    },
    ModelProfile {
        name: "gpt-3.5-turbo",
        strengths: &["speed", "simple-tasks"],
        speed: Speed::VeryFast,
        cost: CostTier::VeryLow,
        max_tokens: 16_385,
        quality: 70,
    },
];

struct Hyperparameters {
    task_match_bonus: f64,
    balanced_quality_weight: f64,
    max_alternatives: usize,
}

static HP: Hyperparameters = Hyperparameters {
    task_match_bonus: 30.0,
    balanced_quality_weight: 0.4,
    max_alternatives: 2,
};

fn speed_points(speed: Speed) -> f64 {
    match speed {
        Speed::VeryFast => 40.0,
        Speed::Fast => 30.0,
        _ => 10.0,
    }
}

fn cost_points(cost: CostTier) -> f64 {
    match cost {
        CostTier::VeryLow => 40.0,
        CostTier::Low => 30.0,
        _ => 10.0,
    }
}

fn balanced_points(model: &ModelProfile) -> f64 {
    let speed = match model.speed {
        Speed::VeryFast => 20.0,
        Speed::Fast => 15.0,
        _ => 10.0,
    };
    let cost = match model.cost {
        CostTier::VeryLow => 20.0,
        CostTier::Low => 15.0,
        _ => 5.0,
    };
    f64::from(model.quality) * HP.balanced_quality_weight + speed + cost
}

fn score(model: &ModelProfile, task: TaskType, priority: RoutePriority) -> f64 {
    let task_match = if model.strengths.contains(&task.as_str()) {
        HP.task_match_bonus
    } else {
        0.0
    };
    let weight = match priority {
        RoutePriority::Speed => speed_points(model.speed),
        RoutePriority::Quality => f64::from(model.quality),
        RoutePriority::Cost => cost_points(model.cost),
        RoutePriority::Balanced => balanced_points(model),
    };
    task_match + weight
}

pub fn profile(name: &str) -> Option<&'static ModelProfile> {
    MODELS.iter().find(|m| m.name == name)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Pick a model for `text`. Models whose context is smaller than the
/// prompt are never considered; `None` means no model can take it.
pub fn route(text: &str, context: &RouteContext) -> Option<RouteDecision> {
    if let Some(preferred) = &context.user_preference {
        return Some(RouteDecision {
            model: preferred.clone(),
            reason: "User preference".to_string(),
            estimated_cost: None,
            quality: profile(preferred).map(|m| m.quality),
            alternatives: Vec::new(),
        });
    }

    let tokens = tokens::estimate(text);
    let mut scored: Vec<ScoredModel> = MODELS
        .iter()
        .filter(|m| m.max_tokens >= tokens)
        .map(|m| ScoredModel {
            model: m.name,
            score: score(m, context.task, context.priority),
            estimated_cost: cost::estimate_prompt_cost(text, m.name, DEFAULT_OUTPUT_TOKENS).per_use,
            quality: m.quality,
            speed: m.speed,
        })
        .collect();
    // Stable: equal scores keep catalog order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut ranked = scored.into_iter();
    let best = ranked.next()?;
    Some(RouteDecision {
        model: best.model.to_string(),
        reason: format!(
            "Task type: {}, Priority: {}, Estimated cost: ${:.4}",
            context.task.as_str(),
            context.priority.as_str(),
            best.estimated_cost
        ),
        estimated_cost: Some(best.estimated_cost),
        quality: Some(best.quality),
        alternatives: ranked.take(HP.max_alternatives).collect(),
    })
}

/// Cost of `text` on every model, cheapest first.
pub fn compare_costs(text: &str, output_tokens: usize) -> Vec<CostComparison> {
    let prompt_tokens = tokens::estimate(text);
    let mut rows: Vec<CostComparison> = MODELS
        .iter()
        .map(|m| {
            let cost = cost::calculate(prompt_tokens, output_tokens, m.name);
            CostComparison {
                model: m.name,
                input_cost: cost.input,
                output_cost: cost.output,
                total_cost: cost.total,
                quality: m.quality,
                speed: m.speed,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.total_cost.total_cmp(&b.total_cost));
    rows
}

/// The highest-quality model that fits `budget`, preferring models strong
/// at `task`. Quality ties go to the cheaper model.
pub fn route_with_budget(text: &str, budget: f64, task: TaskType) -> BudgetDecision {
    let costs = compare_costs(text, DEFAULT_OUTPUT_TOKENS);
    let affordable: Vec<&CostComparison> = costs.iter().filter(|c| c.total_cost <= budget).collect();

    let best_of = |rows: &[&CostComparison]| -> Option<CostComparison> {
        rows.iter()
            .copied()
            .reduce(|best, c| if c.quality > best.quality { c } else { best })
            .cloned()
    };
    let suitable: Vec<&CostComparison> = affordable
        .iter()
        .copied()
        .filter(|c| profile(c.model).is_some_and(|m| m.strengths.contains(&task.as_str())))
        .collect();

    match best_of(&suitable).or_else(|| best_of(&affordable)) {
        Some(chosen) => BudgetDecision::Affordable {
            model: chosen.model,
            cost: chosen.total_cost,
            quality: chosen.quality,
            reason: format!("Best quality within ${budget} budget"),
            savings: budget - chosen.total_cost,
        },
        None => {
            // MODELS is non-empty, so there is always a cheapest row.
            let cheapest = costs[0].clone();
            BudgetDecision::OverBudget {
                shortfall: cheapest.total_cost - budget,
                cheapest,
            }
        }
    }
}
