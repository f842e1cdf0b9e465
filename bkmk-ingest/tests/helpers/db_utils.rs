//! Database helpers for tests

use bkmk_common::db::{init_database, DatabaseOptions};
use bkmk_ingest::db::Ledger;
use tempfile::TempDir;

/// Fresh ledger in a temp directory; keep the `TempDir` alive for the test
pub async fn create_test_ledger() -> (TempDir, Ledger) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("bkmk.db"), &DatabaseOptions::default())
        .await
        .unwrap();
    (temp_dir, Ledger::new(pool))
}

/// Backdate a record
pub async fn set_processed_at(ledger: &Ledger, item_id: &str, processed_at: &str) {
    sqlx::query("UPDATE processed_items SET processed_at = ? WHERE item_id = ?")
        .bind(processed_at)
        .bind(item_id)
        .execute(ledger.pool())
        .await
        .unwrap();
}
