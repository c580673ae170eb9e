//! Operator CLI for AgentLens, grounded on `vex-cli::main`'s
//! `clap::Parser` + `Subcommand` shape and verbosity-to-`EnvFilter`
//! mapping, re-pointed at the event store instead of the VEX runtime.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{export, import, info, keys, retention, verify};

#[derive(Parser)]
#[command(
    name = "agentlens",
    version,
    about = "AgentLens CLI - offline audit verification and tenant data tooling",
    long_about = "Operator tooling for AgentLens deployments: verify an exported\n\
                  event chain without a running server, move tenant data between\n\
                  stores, and issue or revoke API keys."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain of an exported NDJSON event file
    Verify(verify::VerifyArgs),

    /// Export a tenant's agents/sessions/events to NDJSON
    Export(export::ExportArgs),

    /// Import an NDJSON export into a tenant
    Import(import::ImportArgs),

    /// Issue, list, or revoke API keys
    Keys(keys::KeysArgs),

    /// Inspect how close a tenant is to its retention cutoff
    Retention(retention::RetentionArgs),

    /// Show CLI and crate version information
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Verify(args) => verify::run(args),
        Commands::Export(args) => export::run(args).await,
        Commands::Import(args) => import::run(args).await,
        Commands::Keys(args) => keys::run(args).await,
        Commands::Retention(args) => retention::run(args).await,
        Commands::Info(args) => info::run(args),
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}
