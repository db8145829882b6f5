use std::io::Read;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use prompt_forge::assistant::{self, ImproveOptions};
use prompt_forge::cost::{self, CostEstimate, DEFAULT_MODEL, DEFAULT_OUTPUT_TOKENS};
use prompt_forge::router::{self, RouteContext, RoutePriority};
use prompt_forge::{diff, patterns, quality, security, tokens, TaskType};

#[derive(Parser)]
#[command(
    name = "prompt-forge",
    about = "Analyze, sanitize, rewrite and route LLM prompts",
    version
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Input {
    /// File paths to read (reads stdin if none provided)
    files: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Score prompt quality
    Analyze(Input),
    /// Detect prompting techniques and list missing ones for a task
    Patterns {
        #[arg(long, default_value = "general")]
        task: TaskType,
        #[command(flatten)]
        input: Input,
    },
    /// Estimate tokens and cost
    Tokens {
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, default_value_t = DEFAULT_OUTPUT_TOKENS)]
        output_tokens: usize,
        #[command(flatten)]
        input: Input,
    },
    /// Report PII, injection and jailbreak findings
    Scan(Input),
    /// Replace PII with placeholders
    Sanitize(Input),
    /// Rule-based improvement suggestions
    Suggest {
        #[arg(long, default_value = "general")]
        task: TaskType,
        #[command(flatten)]
        input: Input,
    },
    /// Rewrite a prompt with a role, reasoning cue and format line
    Improve {
        #[arg(long, default_value = "general")]
        task: TaskType,
        #[arg(long)]
        chain_of_thought: bool,
        #[arg(long)]
        examples: bool,
        #[command(flatten)]
        input: Input,
    },
    /// Strip filler words and redundant phrases
    Compress(Input),
    /// Choose a model for the prompt
    Route {
        #[arg(long, default_value = "general")]
        task: TaskType,
        #[arg(long, default_value = "balanced")]
        priority: RoutePriority,
        /// Maximum spend per call in USD
        #[arg(long)]
        budget: Option<f64>,
        #[command(flatten)]
        input: Input,
    },
    /// Compare two prompt versions line by line
    Diff {
        old: String,
        new: String,
        /// Print a unified text diff instead of JSON
        #[arg(long)]
        unified: bool,
    },
}

#[derive(Serialize)]
struct TokenReport<'a> {
    tokens: usize,
    model: &'a str,
    cost: CostEstimate,
}

fn read_inputs(input: &Input) -> anyhow::Result<Vec<String>> {
    if input.files.is_empty() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(vec![text]);
    }
    input
        .files
        .iter()
        .map(|path| std::fs::read_to_string(path).with_context(|| format!("error reading {path}")))
        .collect()
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `f` over every input and print each result as JSON.
fn each<T: Serialize>(input: &Input, f: impl Fn(&str) -> anyhow::Result<T>) -> anyhow::Result<()> {
    for text in read_inputs(input)? {
        emit(&f(&text)?)?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze(input) => each(&input, |text| Ok(quality::analyze(text))),
        Command::Patterns { task, input } => {
            each(&input, |text| Ok(patterns::recommendations(text, task)))
        }
        Command::Tokens {
            model,
            output_tokens,
            input,
        } => each(&input, |text| {
            Ok(TokenReport {
                tokens: tokens::estimate(text),
                model: &model,
                cost: cost::estimate_prompt_cost(text, &model, output_tokens),
            })
        }),
        Command::Scan(input) => each(&input, |text| Ok(security::scan(text))),
        Command::Sanitize(input) => each(&input, |text| Ok(security::sanitize(text))),
        Command::Suggest { task, input } => {
            each(&input, |text| Ok(assistant::suggestions(text, task)))
        }
        Command::Improve {
            task,
            chain_of_thought,
            examples,
            input,
        } => {
            let options = ImproveOptions {
                add_chain_of_thought: chain_of_thought,
                add_examples: examples,
                task,
                ..ImproveOptions::default()
            };
            each(&input, |text| {
                Ok(json!({ "improved": assistant::improve(text, options) }))
            })
        }
        Command::Compress(input) => each(&input, |text| Ok(assistant::compress(text))),
        Command::Route {
            task,
            priority,
            budget,
            input,
        } => each(&input, |text| match budget {
            Some(budget) => Ok(serde_json::to_value(router::route_with_budget(text, budget, task))?),
            None => {
                let context = RouteContext {
                    task,
                    priority,
                    user_preference: None,
                };
                match router::route(text, &context) {
                    Some(decision) => Ok(serde_json::to_value(decision)?),
                    None => bail!(
                        "no model accepts a prompt of {} tokens",
                        tokens::estimate(text)
                    ),
                }
            }
        }),
        Command::Diff { old, new, unified } => {
            let old_text =
                std::fs::read_to_string(&old).with_context(|| format!("error reading {old}"))?;
            let new_text =
                std::fs::read_to_string(&new).with_context(|| format!("error reading {new}"))?;
            let ops = diff::calculate_diff(&old_text, &new_text);
            if unified {
                println!("{}", diff::render_unified(&ops));
                Ok(())
            } else {
                emit(&json!({ "stats": diff::stats(&ops), "diff": ops }))
            }
        }
    }
}
