//! Database initialization
//!
//! Opens (or creates) the SQLite ledger database and brings its schema up to date:
//! 1. CREATE TABLE IF NOT EXISTS
//! 2. Automatic schema sync (adds columns missing from older databases)

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Connection pool tuning
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// SQLite busy timeout applied to every pooled connection
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(250),
            max_connections: 8,
        }
    }
}

/// Initialize database connection and create tables if needed
///
/// WAL journaling lets the digest pass read while a batch pass is committing.
pub async fn init_database(db_path: &Path, options: &DatabaseOptions) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(options.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_ledger_table(&pool).await?;
    crate::db::table_schemas::sync_all_table_schemas(&pool).await?;

    Ok(pool)
}

/// Open an existing database read-only
///
/// Never creates the file; a missing database is an error.
pub async fn open_database_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(Error::NotFound(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Ledger of processed items
///
/// `status` is nullable on purpose: rows written before the lifecycle column
/// existed carry NULL and count as completed.
pub async fn create_ledger_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_items (
            item_id TEXT PRIMARY KEY,
            status TEXT,
            processed_at TEXT NOT NULL,
            category TEXT,
            destination_ref TEXT,
            payload TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processed_items_processed_at ON processed_items(processed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
