use std::path::{Path, PathBuf};

use clap::Args;
use indexflow_core::{usage_output_hash, UsageOutputV1};

use super::read_json;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Path to a hashed UsageOutput JSON
    #[arg(long)]
    output: PathBuf,
}

/// Recorded and recomputed digests of one output.
#[derive(Debug)]
struct HashCheck {
    recorded: String,
    computed: String,
}

impl HashCheck {
    fn matches(&self) -> bool {
        self.recorded.eq_ignore_ascii_case(&self.computed)
    }
}

pub fn run(args: VerifyArgs) -> anyhow::Result<()> {
    let check = check_file(&args.output)?;
    anyhow::ensure!(
        check.matches(),
        "canonical hash mismatch: recorded {}, computed {}",
        check.recorded,
        check.computed
    );
    println!("OK {}", check.computed);
    Ok(())
}

fn check_file(path: &Path) -> anyhow::Result<HashCheck> {
    let output: UsageOutputV1 = read_json(path)?;
    let computed = usage_output_hash(&output)?.hash;
    Ok(HashCheck {
        recorded: output.proof.canonical_hash,
        computed,
    })
}
