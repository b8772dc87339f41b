//! Score command.
//!
//! Loads the engine config, builds the cache and the analyzer once, and
//! scores either a single payload or a JSON array of payloads in order.
//! Payloads carrying the same market data reuse cached indicator results.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use confluence_core::{ConfigLoader, DebugLevel, DEFAULT_CONFIG_PATH};
use confluence_signals::{ConfluenceAnalyzer, StampedeCache};
use serde_json::Value;

use super::{print_json, read_payload};

/// Arguments for the score command.
#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    /// Payload file (JSON object or array of objects), `-` for stdin
    #[arg(short, long)]
    pub input: String,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Attach a detailed flow trace to each result
    #[arg(long)]
    pub debug: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Print cache metrics to stderr when done
    #[arg(long)]
    pub stats: bool,
}

/// Runs the score command.
///
/// # Errors
/// Returns an error if the config or payload file cannot be read or parsed.
/// Scoring itself never fails.
pub async fn run_score(args: ScoreArgs) -> Result<()> {
    let mut config = ConfigLoader::load(&args.config)?;
    if args.debug {
        config.debug.enabled = true;
        config.debug.level = DebugLevel::Detailed;
    }

    let cache = Arc::new(StampedeCache::local(config.cache.clone()));
    let analyzer = ConfluenceAnalyzer::from_config(config, Some(cache));

    match read_payload(&args.input)? {
        Value::Array(payloads) => {
            tracing::info!(count = payloads.len(), "Scoring payload batch");
            let mut results = Vec::with_capacity(payloads.len());
            for payload in payloads {
                results.push(analyzer.analyze(payload).await);
            }
            print_json(&results, args.pretty)?;
        }
        payload => {
            let result = analyzer.analyze(payload).await;
            print_json(&result, args.pretty)?;
        }
    }

    if args.stats {
        if let Some(metrics) = analyzer.cache_metrics() {
            eprintln!("{}", serde_json::to_string_pretty(&metrics)?);
            eprintln!("hit rate: {:.1}%", metrics.hit_rate() * 100.0);
        }
    }

    Ok(())
}
