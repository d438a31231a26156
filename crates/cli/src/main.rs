use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "indexflow")]
#[command(about = "Offline IndexFlow usage proof tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a usage input JSON and print the hashed output.
    Evaluate(cmd::evaluate::EvaluateArgs),
    /// Recompute the proof hash of a usage output.
    Verify(cmd::verify::VerifyArgs),
    /// Print the canonical form of a JSON document.
    Canonicalize(cmd::canonicalize::CanonicalizeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate(args) => cmd::evaluate::run(args)?,
        Command::Verify(args) => cmd::verify::run(args)?,
        Command::Canonicalize(args) => cmd::canonicalize::run(args)?,
    }

    Ok(())
}
