use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::db::schema::ensure_schema;

/// Fresh in-memory SQLite database with the full schema.
///
/// A single pooled connection keeps every query on the same in-memory
/// database, so callers must not touch `db` while a transaction is open.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");
    ensure_schema(&db).await.expect("create schema");
    db
}
