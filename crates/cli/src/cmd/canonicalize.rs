use std::path::{Path, PathBuf};

use clap::Args;
use indexflow_core::canonicalize_value;

use super::read_json;

#[derive(Debug, Args)]
pub struct CanonicalizeArgs {
    /// Path to any JSON document
    #[arg(long)]
    input: PathBuf,
}

pub fn run(args: CanonicalizeArgs) -> anyhow::Result<()> {
    println!("{}", canonicalize_file(&args.input)?);
    Ok(())
}

fn canonicalize_file(path: &Path) -> anyhow::Result<String> {
    let value: serde_json::Value = read_json(path)?;
    Ok(canonicalize_value(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn orders_known_keys_then_unknown() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{ "zeta": 1, "wallet": "0xabc", "protocol": "p", "alpha": [2, 1] }"#,
        )
        .unwrap();

        assert_eq!(
            canonicalize_file(file.path()).unwrap(),
            r#"{"protocol":"p","wallet":"0xabc","alpha":[2,1],"zeta":1}"#
        );
    }
}
