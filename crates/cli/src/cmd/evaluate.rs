use std::path::PathBuf;

use clap::Args;
use indexflow_core::{evaluate_usage_v1, UsageEvaluationInput, UsageOutputV1};

use super::read_json;

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Path to a UsageEvaluationInput JSON
    #[arg(long)]
    input: PathBuf,
    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

pub fn run(args: EvaluateArgs) -> anyhow::Result<()> {
    let output = evaluate_file(&args.input)?;
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}

fn evaluate_file(path: &std::path::Path) -> anyhow::Result<UsageOutputV1> {
    let input: UsageEvaluationInput = read_json(path)?;
    Ok(evaluate_usage_v1(&input)?)
}
