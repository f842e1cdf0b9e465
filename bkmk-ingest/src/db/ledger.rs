//! Durable processing ledger
//!
//! Claim/release primitives over `processed_items`. The claim is a single conditional
//! upsert, so two callers racing on the same identifier can never both win.
//!
//! Lifecycle: no row (unseen) → `processing` → `completed` | `failed`.
//! `failed` rows are re-claimable; `processing` rows are re-claimable only once
//! their lease has expired or after startup recovery.

use std::time::Duration;

use bkmk_common::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use super::format_timestamp;
use crate::models::{ItemState, LedgerRecord, RecordPayload};
use crate::utils::retry_on_lock;

/// Default lease after which an in-flight claim may be taken over
pub const DEFAULT_STALE_CLAIM_AFTER: Duration = Duration::from_secs(30 * 60);

/// Default upper bound on lock-contention retries for writes
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Handle to the ledger table
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    stale_claim_after: Duration,
    max_lock_wait_ms: u64,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            stale_claim_after: DEFAULT_STALE_CLAIM_AFTER,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_stale_claim_after(mut self, stale_claim_after: Duration) -> Self {
        self.stale_claim_after = stale_claim_after;
        self
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True iff the item is `completed` or is a legacy row with NULL status
    pub async fn is_handled(&self, item_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT status FROM processed_items WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let status: Option<String> = row.get("status");
                matches!(status.as_deref(), None | Some("completed"))
            }
            None => false,
        })
    }

    /// Atomically move an item into `processing`
    ///
    /// Returns `true` when the row was inserted, or taken over from `failed` or from
    /// a `processing` claim older than the stale lease. Returns `false` for
    /// `completed`, legacy, and freshly claimed rows.
    pub async fn try_claim(&self, item_id: &str) -> Result<bool> {
        let now = Utc::now();
        let claimed_at = format_timestamp(now);
        let stale_before = format_timestamp(
            now - chrono::Duration::from_std(self.stale_claim_after)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        );

        let rows_affected = retry_on_lock("ledger claim", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO processed_items (item_id, status, processed_at, payload)
                VALUES (?, 'processing', ?, '{}')
                ON CONFLICT(item_id) DO UPDATE SET
                    status = 'processing',
                    processed_at = excluded.processed_at,
                    payload = '{}'
                WHERE processed_items.status = 'failed'
                   OR (processed_items.status = 'processing'
                       AND processed_items.processed_at < ?)
                "#,
            )
            .bind(item_id)
            .bind(&claimed_at)
            .bind(&stale_before)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(result.rows_affected())
        })
        .await?;

        let claimed = rows_affected == 1;
        debug!(item_id, claimed, "Claim attempt");
        Ok(claimed)
    }

    /// Overwrite status and timestamp, keeping any other columns
    pub async fn release(&self, item_id: &str, state: ItemState) -> Result<()> {
        let processed_at = format_timestamp(Utc::now());
        let status = state.as_str();

        retry_on_lock("ledger release", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO processed_items (item_id, status, processed_at, payload)
                VALUES (?, ?, ?, '{}')
                ON CONFLICT(item_id) DO UPDATE SET
                    status = excluded.status,
                    processed_at = excluded.processed_at
                "#,
            )
            .bind(item_id)
            .bind(status)
            .bind(&processed_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }

    /// Upsert the full record
    pub async fn commit(
        &self,
        item_id: &str,
        state: ItemState,
        category: Option<&str>,
        destination_ref: Option<&str>,
        payload: &RecordPayload,
    ) -> Result<()> {
        // Serialize before touching the database
        let payload = serde_json::to_string(payload)?;
        let processed_at = format_timestamp(Utc::now());
        let status = state.as_str();

        retry_on_lock("ledger commit", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO processed_items (
                    item_id, status, processed_at, category, destination_ref, payload
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(item_id) DO UPDATE SET
                    status = excluded.status,
                    processed_at = excluded.processed_at,
                    category = excluded.category,
                    destination_ref = excluded.destination_ref,
                    payload = excluded.payload
                "#,
            )
            .bind(item_id)
            .bind(status)
            .bind(&processed_at)
            .bind(category)
            .bind(destination_ref)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<LedgerRecord>> {
        let row = sqlx::query(
            r#"
            SELECT item_id, status, processed_at, category, destination_ref, payload
            FROM processed_items
            WHERE item_id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: Option<String> = row.get("status");
        let status = status
            .map(|s| s.parse::<ItemState>())
            .transpose()
            .map_err(Error::Internal)?;

        Ok(Some(LedgerRecord {
            item_id: row.get("item_id"),
            status,
            processed_at: row.get("processed_at"),
            category: row.get("category"),
            destination_ref: row.get("destination_ref"),
            payload: row.get("payload"),
        }))
    }

    /// Number of rows of any state
    pub async fn total_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Number of `completed` and legacy rows
    pub async fn handled_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM processed_items WHERE status IS NULL OR status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// Reset every `processing` row to `failed`
    ///
    /// Only one worker runs against the ledger, so at startup any in-flight claim
    /// belongs to a predecessor that crashed.
    pub async fn recover_abandoned_claims(&self) -> Result<u64> {
        let processed_at = format_timestamp(Utc::now());

        let recovered = retry_on_lock("ledger recovery", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                "UPDATE processed_items SET status = 'failed', processed_at = ? WHERE status = 'processing'",
            )
            .bind(&processed_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(result.rows_affected())
        })
        .await?;

        if recovered > 0 {
            warn!(recovered, "Recovered abandoned claims from a previous run");
        } else {
            info!("No abandoned claims to recover");
        }

        Ok(recovered)
    }
}
