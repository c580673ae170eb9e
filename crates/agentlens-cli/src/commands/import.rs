//! `agentlens import` — load an NDJSON export into a target tenant,
//! grounded on `agentlens_store::export::import_org_data`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use agentlens_store::export::import_org_data;

#[derive(Args)]
pub struct ImportArgs {
    /// Path to an NDJSON export produced by `agentlens export`
    file: PathBuf,

    /// Tenant to import into; every row is restamped with this tenant
    #[arg(long)]
    tenant: String,

    /// Database connection string; defaults to `sqlite:agentlens.db`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

pub async fn run(args: ImportArgs) -> Result<()> {
    let store = super::open_store(&args.database_url).await?;
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();

    let result = import_org_data(&store, &args.tenant, &lines).await.context("import failed")?;

    println!("{} {}", "Tenant:".dimmed(), args.tenant);
    println!(
        "{} {} agents, {} sessions, {} events",
        "Imported:".dimmed(),
        result.imported.agents,
        result.imported.sessions,
        result.imported.events
    );
    match result.checksum_valid {
        Some(true) => println!("{} checksum verified", "✓".green().bold()),
        Some(false) => println!("{} checksum mismatch — the file may be truncated or edited", "✗".red().bold()),
        None => println!("{} no checksum line present", "⚠".yellow().bold()),
    }
    if !result.errors.is_empty() {
        println!();
        println!("{}", "Errors:".bold());
        for err in &result.errors {
            println!("  {} {}", "•".red(), err);
        }
    }

    if result.checksum_valid == Some(false) {
        std::process::exit(1);
    }
    Ok(())
}
