//! Offline chain verification over an exported NDJSON file, grounded on
//! `vex-cli::commands::verify`'s file-reading + colored pass/fail report
//! shape, re-pointed at [`agentlens_core::hash::verify_chain`] instead of
//! a Merkle-root field on a single JSON blob.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;

use agentlens_core::event::Event;
use agentlens_core::hash::verify_chain;

#[derive(Args)]
pub struct VerifyArgs {
    /// Path to an NDJSON export produced by `agentlens export`
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print every session's verification result, not just failures
    #[arg(long)]
    detailed: bool,
}

pub fn run(args: VerifyArgs) -> Result<()> {
    println!("{}", "AgentLens Chain Verification".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!();

    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let mut by_session: HashMap<String, Vec<Event>> = HashMap::new();
    let mut event_count = 0usize;
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("line {i}: invalid JSON"))?;
        if value.get("_type").and_then(|t| t.as_str()) != Some("event") {
            continue;
        }
        let event: Event = serde_json::from_value(value).with_context(|| format!("line {i}: malformed event"))?;
        event_count += 1;
        by_session.entry(event.session_id.clone()).or_default().push(event);
    }

    println!("  {} {}", "File:".dimmed(), args.file.display());
    println!("  {} {}", "Events:".dimmed(), event_count);
    println!("  {} {}", "Sessions:".dimmed(), by_session.len());
    println!();

    let mut failures = 0;
    for (session_id, mut events) in by_session {
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let result = verify_chain(&events);
        if result.valid {
            if args.detailed {
                println!("  {} {} ({} events)", "✓".green().bold(), session_id, events.len());
            }
        } else {
            failures += 1;
            println!(
                "  {} {} — {}",
                "✗".red().bold(),
                session_id,
                result.reason.unwrap_or_else(|| "unknown failure".to_string())
            );
        }
    }

    println!();
    if failures == 0 {
        println!("{} all sessions verified", "✓".green().bold());
        Ok(())
    } else {
        println!("{} {failures} session(s) failed chain verification", "✗".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_sessions() {
        let by_session: HashMap<String, Vec<Event>> = HashMap::new();
        assert!(by_session.is_empty());
    }
}
