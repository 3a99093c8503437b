//! Access audit.
//!
//! Every attempt, granted or refused, produces one [`AccessLogEntry`]. The row
//! goes to the directory's access log table and, when a database pool is
//! configured, to the local hash-chained ledger. A failed write is logged at
//! `warn`, counted per sink, and reported back to the caller; it never changes
//! the access decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dplus_core::{AccessLogEntry, AccessLogId, AccessOutcome, UserId};
use sqlx::PgPool;

use super::AccessRequest;
use crate::directory::Directory;
use crate::extractors::ClientContext;
use crate::middleware::metrics::ApiMetrics;

/// Writes access rows to every configured sink.
#[derive(Clone)]
pub struct AccessAuditor {
    directory: Arc<dyn Directory>,
    ledger: Option<PgPool>,
    metrics: ApiMetrics,
}

impl std::fmt::Debug for AccessAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessAuditor")
            .field("directory", &self.directory.name())
            .field("ledger", &self.ledger.is_some())
            .finish()
    }
}

impl AccessAuditor {
    pub fn new(directory: Arc<dyn Directory>, ledger: Option<PgPool>, metrics: ApiMetrics) -> Self {
        Self {
            directory,
            ledger,
            metrics,
        }
    }

    /// Write `entry` to every sink. Returns whether all of them accepted it.
    pub async fn record(&self, entry: &AccessLogEntry) -> bool {
        let mut recorded = true;

        if let Err(e) = self.directory.record_access(entry).await {
            tracing::warn!(
                entry_id = %entry.id,
                outcome = %entry.outcome,
                "access log write failed, continuing: {e}"
            );
            self.metrics.record_audit_failure("directory");
            recorded = false;
        }

        if let Some(pool) = &self.ledger {
            if let Err(e) = crate::db::access_ledger::append(pool, entry).await {
                tracing::warn!(
                    entry_id = %entry.id,
                    outcome = %entry.outcome,
                    "access ledger append failed, continuing: {e}"
                );
                self.metrics.record_audit_failure("ledger");
                recorded = false;
            }
        }

        recorded
    }
}

/// Mask a code as submitted, which may not be a valid code.
pub fn mask_submitted(raw: &str) -> String {
    let prefix: String = raw.trim().to_uppercase().chars().take(4).collect();
    format!("{prefix}****")
}

/// Build the audit row for one attempt.
pub fn build_entry(
    request: &AccessRequest,
    context: &ClientContext,
    outcome: AccessOutcome,
    subject: Option<UserId>,
    details: serde_json::Value,
    now: DateTime<Utc>,
) -> AccessLogEntry {
    AccessLogEntry {
        id: AccessLogId::new(),
        user_id: subject,
        code_used: mask_submitted(&request.code),
        accessor_name: request.accessor_name.clone(),
        accessor_institution: request.accessor_institution.clone(),
        outcome,
        ip_address: context.ip_address.clone(),
        user_agent: context.user_agent.clone(),
        accessed_at: now,
        details,
    }
}
