//! # dplus-cli — Operator CLI for DirectivesPlus
//!
//! Provides the `dplus` command-line interface.
//!
//! ## Subcommands
//!
//! - `dplus code generate` — Issue institution codes with their expiry.
//! - `dplus validate` — Run an institution access attempt against the platform.
//! - `dplus ledger` — Inspect and verify the local access ledger.
//!
//! ```bash
//! dplus code generate --days 30
//! dplus validate --code 9E5CUV7X --first-name Farid --last-name Arezki --birth-date 1963-08-13
//! DATABASE_URL=postgres://... dplus ledger verify --limit 5000
//! ```

pub mod code;
pub mod ledger;
pub mod validate;

/// Build the single-threaded runtime used by the async subcommands.
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
