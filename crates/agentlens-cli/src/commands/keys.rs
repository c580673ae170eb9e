//! `agentlens keys` — issue, list, and revoke API keys, grounded on
//! `vex-persist::api_key_store`'s `ApiKeyRecord::new` plaintext-once
//! contract: the key is printed exactly once at issuance and never
//! again.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use comfy_table::Table;
use uuid::Uuid;

use agentlens_store::{ApiKeyRecord, ApiKeyStore, Scope};

#[derive(Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    command: KeysCommand,

    /// Database connection string; defaults to `sqlite:agentlens.db`
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Issue a new API key
    Issue {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        name: String,
        /// One or more of read, write, manage, audit, billing, or `*` for all
        #[arg(long, value_delimiter = ',', default_value = "read")]
        scopes: Vec<String>,
        /// Expire the key after this many days
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
    /// List keys for a tenant
    List {
        #[arg(long)]
        tenant: String,
    },
    /// Revoke a key by id
    Revoke {
        #[arg(long)]
        id: Uuid,
    },
}

pub async fn run(args: KeysArgs) -> Result<()> {
    let store = super::open_api_keys(&args.database_url).await?;
    match args.command {
        KeysCommand::Issue { tenant, name, scopes, expires_in_days } => issue(&*store, &tenant, &name, &scopes, expires_in_days).await,
        KeysCommand::List { tenant } => list(&*store, &tenant).await,
        KeysCommand::Revoke { id } => revoke(&*store, id).await,
    }
}

async fn issue(
    store: &dyn ApiKeyStore,
    tenant: &str,
    name: &str,
    scopes: &[String],
    expires_in_days: Option<u32>,
) -> Result<()> {
    let parsed: Vec<Scope> = scopes
        .iter()
        .map(|s| Scope::parse(s.trim()).ok_or_else(|| anyhow::anyhow!("unknown scope `{s}`")))
        .collect::<Result<_>>()?;
    if parsed.is_empty() {
        bail!("at least one scope is required");
    }

    let (record, plaintext) = ApiKeyRecord::new(tenant, name, parsed, expires_in_days);
    store.create(&record).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{} key issued for {}", "✓".green().bold(), tenant);
    println!();
    println!("  {}", plaintext.yellow().bold());
    println!();
    println!("{}", "This key will not be shown again.".dimmed());
    Ok(())
}

async fn list(store: &dyn ApiKeyStore, tenant: &str) -> Result<()> {
    let records = store.find_by_tenant(tenant).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut table = Table::new();
    table.set_header(vec!["id", "name", "prefix", "scopes", "revoked", "expires_at"]);
    for r in &records {
        table.add_row(vec![
            r.id.to_string(),
            r.name.clone(),
            r.key_prefix.clone(),
            r.scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(","),
            r.revoked.to_string(),
            r.expires_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn revoke(store: &dyn ApiKeyStore, id: Uuid) -> Result<()> {
    store.revoke(id).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{} key {} revoked", "✓".green().bold(), id);
    Ok(())
}
