//! Validate command: runs both validation passes and prints the report.

use anyhow::{bail, Result};
use clap::Args;
use confluence_core::{ConfigLoader, DEFAULT_CONFIG_PATH};
use confluence_signals::ConfluenceAnalyzer;

use super::{print_json, read_payload};

/// Arguments for the validate command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Payload file (JSON object), `-` for stdin
    #[arg(short, long)]
    pub input: String,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Runs the validate command.
///
/// # Errors
/// Returns an error if the files cannot be read, or if the payload is invalid.
pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)?;
    let analyzer = ConfluenceAnalyzer::from_config(config, None);

    let mut payload = read_payload(&args.input)?;
    let report = analyzer.validate_only(&mut payload);
    print_json(&report, true)?;

    if !report.is_valid() {
        bail!(
            "payload invalid: {}",
            report.error.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}
