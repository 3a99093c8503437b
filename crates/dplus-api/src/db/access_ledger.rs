//! Access ledger persistence: immutable hash chain.
//!
//! Each access attempt appends a row whose SHA-256 hash chains to the
//! previous row's hash, forming a tamper-evident log. Appends take a
//! transaction-scoped advisory lock so concurrent writers cannot fork the
//! chain.

use chrono::{DateTime, Utc};
use dplus_core::AccessLogEntry;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Hash the first row chains to.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key serializing appends.
const APPEND_LOCK_KEY: i64 = 0x6470_6c75_735f_6c67;

/// Database row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    pub seq: i64,
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub code_used: String,
    pub accessor_name: Option<String>,
    pub accessor_institution: Option<String>,
    pub outcome: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub accessed_at: DateTime<Utc>,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// Every stored column of a row except `seq` and the two hashes.
#[derive(Debug, Clone, Copy)]
pub struct ChainedFields<'a> {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub code_used: &'a str,
    pub accessor_name: Option<&'a str>,
    pub accessor_institution: Option<&'a str>,
    pub outcome: &'a str,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub details: &'a serde_json::Value,
    pub accessed_at: DateTime<Utc>,
}

impl<'a> From<&'a LedgerRow> for ChainedFields<'a> {
    fn from(row: &'a LedgerRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            code_used: &row.code_used,
            accessor_name: row.accessor_name.as_deref(),
            accessor_institution: row.accessor_institution.as_deref(),
            outcome: &row.outcome,
            ip_address: row.ip_address.as_deref(),
            user_agent: row.user_agent.as_deref(),
            details: &row.details,
            accessed_at: row.accessed_at,
        }
    }
}

impl<'a> From<&'a AccessLogEntry> for ChainedFields<'a> {
    fn from(entry: &'a AccessLogEntry) -> Self {
        Self {
            id: *entry.id.as_uuid(),
            user_id: entry.user_id.map(|u| *u.as_uuid()),
            code_used: &entry.code_used,
            accessor_name: entry.accessor_name.as_deref(),
            accessor_institution: entry.accessor_institution.as_deref(),
            outcome: entry.outcome.as_str(),
            ip_address: entry.ip_address.as_deref(),
            user_agent: entry.user_agent.as_deref(),
            details: &entry.details,
            accessed_at: entry.accessed_at,
        }
    }
}

/// Compute the hash of a row.
///
/// The input is a JSON array of the previous hash and every chained field,
/// so free text cannot collide across field boundaries. `details` keys are
/// sorted at every depth, matching what survives a JSONB round trip.
/// Timestamps enter as microseconds, the precision Postgres stores.
pub fn entry_hash(previous_hash: &str, fields: &ChainedFields<'_>) -> String {
    let hash_input = serde_json::json!([
        previous_hash,
        fields.id,
        fields.user_id,
        fields.code_used,
        fields.accessor_name,
        fields.accessor_institution,
        fields.outcome,
        fields.ip_address,
        fields.user_agent,
        canonical_json(fields.details),
        fields.accessed_at.timestamp_micros(),
    ]);
    sha256_hex(&hash_input.to_string())
}

/// Rebuild `value` with object keys in sorted order.
fn canonical_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical_json(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

/// Append an access attempt. Returns the new row's hash.
pub async fn append(pool: &PgPool, entry: &AccessLogEntry) -> Result<String, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(APPEND_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT entry_hash FROM access_ledger ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let prev = previous_hash.as_deref().unwrap_or(GENESIS_HASH);

    let fields = ChainedFields::from(entry);
    let hash = entry_hash(prev, &fields);

    sqlx::query(
        "INSERT INTO access_ledger (id, user_id, code_used, accessor_name, accessor_institution,
         outcome, ip_address, user_agent, details, accessed_at, previous_hash, entry_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(fields.id)
    .bind(fields.user_id)
    .bind(&entry.code_used)
    .bind(&entry.accessor_name)
    .bind(&entry.accessor_institution)
    .bind(entry.outcome.as_str())
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(&entry.details)
    .bind(entry.accessed_at)
    .bind(prev)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(hash)
}

/// Ledger rows for one patient, most recent first.
pub async fn entries_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<LedgerRow>, sqlx::Error> {
    sqlx::query_as::<_, LedgerRow>(
        "SELECT seq, id, user_id, code_used, accessor_name, accessor_institution, outcome,
         ip_address, user_agent, details, accessed_at, previous_hash, entry_hash
         FROM access_ledger
         WHERE user_id = $1
         ORDER BY seq DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Verify the first `limit` rows of the chain.
pub async fn verify_chain_integrity(
    pool: &PgPool,
    limit: i64,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT seq, id, user_id, code_used, accessor_name, accessor_institution, outcome,
         ip_address, user_agent, details, accessed_at, previous_hash, entry_hash
         FROM access_ledger ORDER BY seq ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(verify_rows(&rows))
}

/// Check link continuity and recompute every hash.
pub fn verify_rows(rows: &[LedgerRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut tampered_entries = 0;
    let mut expected_prev = GENESIS_HASH;

    for row in rows {
        if row.previous_hash != expected_prev {
            broken_links += 1;
        }
        let recomputed = entry_hash(&row.previous_hash, &ChainedFields::from(row));
        if recomputed != row.entry_hash {
            tampered_entries += 1;
        }
        expected_prev = &row.entry_hash;
    }

    ChainIntegrityResult {
        total_entries: rows.len(),
        broken_links,
        tampered_entries,
        chain_valid: broken_links == 0 && tampered_entries == 0,
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainIntegrityResult {
    pub total_entries: usize,
    /// Rows whose `previous_hash` is not the preceding row's hash.
    pub broken_links: usize,
    /// Rows whose stored hash does not match their contents.
    pub tampered_entries: usize,
    pub chain_valid: bool,
}

/// Compute SHA-256 hex digest of input string.
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chain(n: usize) -> Vec<LedgerRow> {
        let mut rows = Vec::new();
        let mut prev = GENESIS_HASH.to_string();
        for i in 0..n {
            let id = Uuid::new_v4();
            let accessed_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, i as u32).unwrap();
            let mut row = LedgerRow {
                seq: i as i64 + 1,
                id,
                user_id: None,
                code_used: "9E5C****".into(),
                accessor_name: Some("Dr Martin".into()),
                accessor_institution: Some("CHU de Lyon".into()),
                outcome: "granted".into(),
                ip_address: Some("203.0.113.7".into()),
                user_agent: Some("Mozilla/5.0".into()),
                details: serde_json::json!({"path": "authority", "patients": 1}),
                accessed_at,
                previous_hash: prev.clone(),
                entry_hash: String::new(),
            };
            let hash = entry_hash(&prev, &ChainedFields::from(&row));
            row.entry_hash = hash.clone();
            prev = hash;
            rows.push(row);
        }
        rows
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn intact_chain_verifies() {
        let result = verify_rows(&chain(5));
        assert_eq!(result.total_entries, 5);
        assert!(result.chain_valid);
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(verify_rows(&[]).chain_valid);
    }

    #[test]
    fn edited_outcome_is_detected() {
        let mut rows = chain(3);
        rows[1].outcome = "profile_mismatch".into();
        let result = verify_rows(&rows);
        assert_eq!(result.tampered_entries, 1);
        assert_eq!(result.broken_links, 0);
        assert!(!result.chain_valid);
    }

    #[test]
    fn edited_accessor_is_detected() {
        let mut rows = chain(3);
        rows[1].accessor_name = Some("Someone Else".into());
        let result = verify_rows(&rows);
        assert_eq!(result.tampered_entries, 1);
        assert!(!result.chain_valid);

        let mut rows = chain(3);
        rows[2].accessor_institution = None;
        assert_eq!(verify_rows(&rows).tampered_entries, 1);
    }

    #[test]
    fn edited_client_fields_are_detected() {
        let mut rows = chain(3);
        rows[0].ip_address = Some("198.51.100.1".into());
        rows[1].user_agent = None;
        assert_eq!(verify_rows(&rows).tampered_entries, 2);
    }

    #[test]
    fn edited_details_are_detected() {
        let mut rows = chain(3);
        rows[1].details = serde_json::json!({"path": "fallback", "patients": 1});
        assert_eq!(verify_rows(&rows).tampered_entries, 1);
    }

    #[test]
    fn details_key_order_does_not_matter() {
        let mut rows = chain(1);
        rows[0].details = serde_json::from_str(r#"{"b": {"y": 1, "x": 2}, "a": [1, 2]}"#).unwrap();
        let hash = entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0]));
        rows[0].details = serde_json::from_str(r#"{"a": [1, 2], "b": {"x": 2, "y": 1}}"#).unwrap();
        assert_eq!(hash, entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0])));
    }

    #[test]
    fn separator_in_free_text_does_not_collide() {
        let mut rows = chain(1);
        rows[0].accessor_name = Some("Dr|Martin".into());
        rows[0].accessor_institution = None;
        let a = entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0]));
        rows[0].accessor_name = Some("Dr".into());
        rows[0].accessor_institution = Some("Martin".into());
        let b = entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0]));
        assert_ne!(a, b);
    }

    #[test]
    fn deleted_row_breaks_link() {
        let mut rows = chain(4);
        rows.remove(1);
        let result = verify_rows(&rows);
        assert_eq!(result.broken_links, 1);
        assert!(!result.chain_valid);
    }

    #[test]
    fn hash_ignores_sub_microsecond_precision() {
        let mut rows = chain(1);
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        rows[0].accessed_at = base + chrono::Duration::nanoseconds(1_000_400);
        let a = entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0]));
        rows[0].accessed_at = base + chrono::Duration::microseconds(1_000);
        let b = entry_hash(GENESIS_HASH, &ChainedFields::from(&rows[0]));
        assert_eq!(a, b);
    }
}
