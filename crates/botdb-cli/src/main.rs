//! botdb — inspect and maintain bot state files.
//!
//! # Usage
//!
//! ```text
//! botdb inspect /var/lib/bots/alpha.json
//! botdb sweep /var/lib/bots/alpha.json --now 1700000000
//! ```
//!
//! Only run maintenance commands against a file whose bot is stopped: a state
//! file has exactly one owner at a time.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use botdb_core::BotDbConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "botdb",
    about = "Inspect and maintain bot state files",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to botdb.toml (defaults apply when omitted).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a state file
    Inspect {
        path: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// List queued background redemptions in processing order
    Pending { path: PathBuf },
    /// Remove expired risky-app exclusions and save the file
    Sweep {
        path: PathBuf,
        /// Unix time to sweep against (default: now)
        #[arg(long)]
        now: Option<u64>,
    },
    /// Check that a state file loads
    Validate { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,botdb=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BotDbConfig::from_file(path)?,
        None => BotDbConfig::default(),
    };

    match cli.command {
        Commands::Inspect { path, format } => {
            let summary = commands::inspect::inspect(&path, &config).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                _ => println!("{}", summary.to_text()),
            }
        }
        Commands::Pending { path } => {
            for (key, name) in commands::inspect::pending(&path, &config).await? {
                println!("{key}\t{name}");
            }
        }
        Commands::Sweep { path, now } => {
            let removed = commands::sweep::sweep(&path, &config, now).await?;
            println!("✓ Removed {removed} expired exclusion(s) from {}", path.display());
        }
        Commands::Validate { path } => {
            commands::inspect::validate(&path, &config).await?;
            println!("✓ {} is valid", path.display());
        }
    }

    Ok(())
}
