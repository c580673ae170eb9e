//! `agentlens info` — version and build summary, grounded on
//! `vex-cli::commands::info`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct InfoArgs;

pub fn run(_args: InfoArgs) -> Result<()> {
    println!("{}", "AgentLens".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!();
    println!("{}", "Version:".bold());
    println!("  {} {}", "CLI:".dimmed(), env!("CARGO_PKG_VERSION").green());
    println!();
    println!("{}", "Commands:".bold());
    println!("  {} verify an NDJSON export's hash chain", "agentlens verify <file>".green());
    println!("  {} export a tenant's data to NDJSON", "agentlens export --tenant <id>".green());
    println!("  {} import an NDJSON export into a tenant", "agentlens import <file> --tenant <id>".green());
    println!("  {} issue/list/revoke API keys", "agentlens keys issue|list|revoke".green());
    println!("  {} inspect a tenant's retention cutoff", "agentlens retention --tenant <id>".green());
    println!();
    Ok(())
}
