//! Per-model pricing and prompt cost estimates.

use serde::Serialize;

use crate::tokens;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4";
pub const DEFAULT_OUTPUT_TOKENS: usize = 500;

/// Share of the output budget assumed to be used on an average call.
const AVERAGE_OUTPUT_SHARE: f64 = 0.5;
const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    /// USD per million input tokens.
    pub input: f64,
    /// USD per million output tokens.
    pub output: f64,
}

pub static PRICING: &[(&str, Pricing)] = &[
    ("claude-sonnet-4", Pricing { input: 3.00, output: 15.00 }),
    ("claude-sonnet-3.5", Pricing { input: 3.00, output: 15.00 }),
    ("claude-haiku", Pricing { input: 0.25, output: 1.25 }),
    ("gpt-4", Pricing { input: 30.00, output: 60.00 }),
    ("gpt-4-turbo", Pricing { input: 10.00, output: 30.00 }),
    ("gpt-3.5-turbo", Pricing { input: 0.50, output: 1.50 }),
    ("gpt-4o", Pricing { input: 5.00, output: 15.00 }),
    ("gpt-4o-mini", Pricing { input: 0.15, output: 0.60 }),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub input: f64,
    pub output: f64,
    pub total: f64,
    pub per_use: f64,
}

/// Pricing for `model`, falling back to the default model when unknown.
pub fn pricing_for(model: &str) -> Pricing {
    PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .or_else(|| PRICING.iter().find(|(name, _)| *name == DEFAULT_MODEL))
        .map(|(_, p)| *p)
        .unwrap_or(Pricing {
            input: 3.00,
            output: 15.00,
        })
}

pub fn calculate(prompt_tokens: usize, output_tokens: usize, model: &str) -> CostEstimate {
    let pricing = pricing_for(model);
    let input = prompt_tokens as f64 / TOKENS_PER_PRICE_UNIT * pricing.input;
    let output = output_tokens as f64 / TOKENS_PER_PRICE_UNIT * pricing.output;
    CostEstimate {
        input,
        output,
        total: input + output,
        per_use: input + output * AVERAGE_OUTPUT_SHARE,
    }
}

pub fn estimate_prompt_cost(text: &str, model: &str, output_tokens: usize) -> CostEstimate {
    calculate(tokens::estimate(text), output_tokens, model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn prices_per_million_tokens() {
        let cost = calculate(1_000_000, 1_000_000, "gpt-4o-mini");
        assert!(close(cost.input, 0.15));
        assert!(close(cost.output, 0.60));
        assert!(close(cost.total, 0.75));
        assert!(close(cost.per_use, 0.45));
    }

    #[test]
    fn unknown_model_uses_default_pricing() {
        assert_eq!(pricing_for("llama-9000"), pricing_for(DEFAULT_MODEL));
    }

    #[test]
    fn empty_prompt_only_pays_for_output() {
        let cost = estimate_prompt_cost("", DEFAULT_MODEL, DEFAULT_OUTPUT_TOKENS);
        assert_eq!(cost.input, 0.0);
        assert!(close(cost.output, 500.0 / 1_000_000.0 * 15.0));
    }
}
