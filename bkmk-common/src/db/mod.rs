//! Database initialization and schema maintenance

pub mod init;
pub mod schema_sync;
pub mod table_schemas;

pub use init::{create_ledger_table, init_database, open_database_readonly, DatabaseOptions};
