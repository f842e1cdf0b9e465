//! Table Schema Definitions
//!
//! Single source of truth for the columns each table is expected to carry.

use crate::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use crate::Result;
use sqlx::SqlitePool;

/// `processed_items` (the ledger)
///
/// Databases created before the lifecycle state machine have no `status`,
/// `destination_ref` or `payload` columns; sync adds them and existing rows keep
/// a NULL status, which the ledger reads as "completed".
pub struct LedgerTableSchema;

impl TableSchema for LedgerTableSchema {
    fn table_name() -> &'static str {
        "processed_items"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("item_id", "TEXT").primary_key(),
            ColumnDefinition::new("status", "TEXT"),
            ColumnDefinition::new("processed_at", "TEXT")
                .not_null()
                .default("'1970-01-01T00:00:00.000Z'"),
            ColumnDefinition::new("category", "TEXT"),
            ColumnDefinition::new("destination_ref", "TEXT"),
            ColumnDefinition::new("payload", "TEXT")
                .not_null()
                .default("'{}'"),
        ]
    }
}

/// Synchronize all table schemas
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    SchemaSync::sync_table::<LedgerTableSchema>(pool).await
}
