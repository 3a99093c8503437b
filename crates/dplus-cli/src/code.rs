//! # Code Subcommand
//!
//! Issues institution codes offline. The codes are not stored anywhere;
//! use the API (`POST /v1/directives/{id}/institution-code`) to attach one
//! to a directive.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;

use dplus_core::{CodeLifetime, InstitutionCode};

/// Arguments for the `dplus code` subcommand.
#[derive(Args, Debug)]
pub struct CodeArgs {
    #[command(subcommand)]
    pub command: CodeCommand,
}

/// Code subcommands.
#[derive(Subcommand, Debug)]
pub enum CodeCommand {
    /// Generate fresh institution codes.
    Generate {
        /// Validity in days.
        #[arg(long, default_value_t = CodeLifetime::DEFAULT_DAYS)]
        days: u32,
        /// Number of codes to generate.
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Print JSON lines instead of plain text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct IssuedCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Execute the code subcommand.
pub fn run_code(args: &CodeArgs) -> Result<u8> {
    match &args.command {
        CodeCommand::Generate { days, count, json } => {
            if *days == 0 {
                bail!("--days must be at least 1");
            }
            if *count == 0 || *count > 1000 {
                bail!("--count must be between 1 and 1000");
            }
            for issued in issue(CodeLifetime::days(*days), *count, Utc::now()) {
                if *json {
                    println!("{}", serde_json::to_string(&issued)?);
                } else {
                    println!("{}  expires {}", issued.code, issued.expires_at.to_rfc3339());
                }
            }
            tracing::info!(count, days, "institution codes generated");
            Ok(0)
        }
    }
}

fn issue(lifetime: CodeLifetime, count: u32, now: DateTime<Utc>) -> Vec<IssuedCode> {
    (0..count)
        .map(|_| IssuedCode {
            code: InstitutionCode::generate().as_str().to_string(),
            expires_at: lifetime.expires_at(now),
        })
        .collect()
}
