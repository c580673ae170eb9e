//! `agentlens retention status` — report how close a tenant is to its
//! plan tier's retention cutoff, grounded on
//! `agentlens_store::retention_job::events_approaching_expiry`. No
//! partition health is reported here: the SQLite backend keeps events in
//! a single table rather than month partitions, so spec §4.6's partition
//! maintenance step (itself conditional on "if the backend partitions by
//! month") does not apply to this deployment.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::Table;

use agentlens_core::retention::PlanTier;
use agentlens_store::retention_job::events_approaching_expiry;

#[derive(Args)]
pub struct RetentionArgs {
    #[arg(long)]
    tenant: String,

    /// Plan tier to evaluate against; defaults to `free`
    #[arg(long, default_value = "free")]
    tier: String,

    /// Warning window in days
    #[arg(long, default_value_t = 7)]
    warning_days: i64,

    /// Database connection string; defaults to `sqlite:agentlens.db`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

fn parse_tier(s: &str) -> Option<PlanTier> {
    match s {
        "free" => Some(PlanTier::Free),
        "pro" => Some(PlanTier::Pro),
        "team" => Some(PlanTier::Team),
        "enterprise" => Some(PlanTier::Enterprise),
        _ => None,
    }
}

pub async fn run(args: RetentionArgs) -> Result<()> {
    let tier = parse_tier(&args.tier).ok_or_else(|| anyhow::anyhow!("unknown plan tier `{}`", args.tier))?;
    let store = super::open_store(&args.database_url).await?;
    let policy = tier.default_retention();
    let approaching = events_approaching_expiry(&store, &args.tenant, &policy, args.warning_days).await;

    let mut table = Table::new();
    table.set_header(vec!["tenant", "tier", "event_retention_days", "audit_log_retention_days", "approaching_expiry"]);
    table.add_row(vec![
        args.tenant.clone(),
        args.tier.clone(),
        policy.event_days.to_string(),
        policy.audit_log_days.to_string(),
        approaching.to_string(),
    ]);
    println!("{table}");

    if approaching > 0 {
        println!(
            "{} {} event(s) will be purged within the next {} day(s)",
            "⚠".yellow().bold(),
            approaching,
            args.warning_days
        );
    }
    Ok(())
}
