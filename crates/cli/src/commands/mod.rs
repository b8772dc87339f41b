//! CLI commands for the confluence scoring engine.

pub mod score;
pub mod validate;

pub use score::{run_score, ScoreArgs};
pub use validate::{run_validate, ValidateArgs};

use anyhow::{Context, Result};
use serde_json::Value;

/// Reads a JSON payload from a file, or from stdin when `path` is `-`.
pub(crate) fn read_payload(path: &str) -> Result<Value> {
    let text = if path == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read payload from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?
    };
    serde_json::from_str(&text).with_context(|| format!("{path} is not valid JSON"))
}

/// Prints a value as JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
