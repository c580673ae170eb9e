//! `agentlens export` — write a tenant's agents/sessions/events to NDJSON,
//! grounded on `agentlens_store::export::export_org_data` (no direct
//! teacher analog; the teacher's audit store exports one entity type per
//! call, not a dependency-ordered multi-entity stream).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use agentlens_store::export::{export_org_data, ExportRange};

#[derive(Args)]
pub struct ExportArgs {
    /// Tenant to export
    #[arg(long)]
    tenant: String,

    /// Output NDJSON path; defaults to stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    out: Option<PathBuf>,

    /// Database connection string; defaults to `sqlite:agentlens.db`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Only export events at or after this RFC 3339 timestamp
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Only export events at or before this RFC 3339 timestamp
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

pub async fn run(args: ExportArgs) -> Result<()> {
    let store = super::open_store(&args.database_url).await?;
    let range = ExportRange { from: args.from, to: args.to };
    let lines = export_org_data(&store, &args.tenant, &range)
        .await
        .context("export failed")?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, lines.join("\n") + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} wrote {} lines to {}", "✓".green().bold(), lines.len(), path.display());
        }
        None => {
            for line in &lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}
