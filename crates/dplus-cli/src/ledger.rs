//! # Ledger Subcommand
//!
//! Reads the Postgres access ledger written by `dplus-api` when
//! `DATABASE_URL` is set.
//!
//! - `verify` — Recompute the hash chain and report broken or edited rows.
//! - `show` — List the most recent rows for one patient.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use dplus_api::db::{self, access_ledger};

/// Arguments for the `dplus ledger` subcommand.
#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[command(subcommand)]
    pub command: LedgerCommand,
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// Verify the hash chain from the first row.
    Verify {
        /// Maximum number of rows to check.
        #[arg(long, default_value_t = 10_000)]
        limit: i64,
    },

    /// Show recent access rows for a patient.
    Show {
        /// Patient user id.
        #[arg(long)]
        user: Uuid,
        /// Maximum number of rows.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// Execute the ledger subcommand. Exit code 2 means the chain is broken.
pub fn run_ledger(args: &LedgerArgs) -> Result<u8> {
    crate::runtime()?.block_on(async {
        let pool = db::connect(&args.database_url)
            .await
            .context("connecting to the access ledger database")?;

        match &args.command {
            LedgerCommand::Verify { limit } => {
                let result = access_ledger::verify_chain_integrity(&pool, *limit)
                    .await
                    .context("reading the access ledger")?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                if result.chain_valid {
                    tracing::info!(entries = result.total_entries, "access ledger chain intact");
                    Ok(0)
                } else {
                    tracing::error!(
                        broken_links = result.broken_links,
                        tampered_entries = result.tampered_entries,
                        "access ledger chain broken"
                    );
                    Ok(2)
                }
            }
            LedgerCommand::Show { user, limit } => {
                let rows = access_ledger::entries_for_user(&pool, *user, *limit)
                    .await
                    .context("reading the access ledger")?;
                if rows.is_empty() {
                    println!("No access recorded for {user}");
                }
                for row in rows {
                    println!(
                        "{}  {:<16}  {}  {}",
                        row.accessed_at.to_rfc3339(),
                        row.outcome,
                        row.code_used,
                        row.accessor_institution.as_deref().unwrap_or("-"),
                    );
                }
                Ok(0)
            }
        }
    })
}
