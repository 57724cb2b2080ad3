use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on SQLite's writer lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the shared connection pool. Every pooled connection enforces
/// foreign keys and queues behind concurrent writers instead of failing.
pub fn build_pool(db_path: &Path) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    Pool::builder().build(manager)
}

pub mod config;
pub mod error;
pub mod helper;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod setup;
