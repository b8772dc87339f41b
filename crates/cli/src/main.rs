use clap::{Parser, Subcommand};

mod commands;

use commands::{ScoreArgs, ValidateArgs};

#[derive(Parser, Debug)]
#[command(name = "confluence")]
#[command(about = "Confluence scoring engine for multi-source market data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a market payload and print the confluence result
    Score(ScoreArgs),
    /// Validate a market payload without scoring it
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Score(args) => commands::run_score(args).await?,
        Commands::Validate(args) => commands::run_validate(args)?,
    }

    Ok(())
}
