use crate::models::db_operations::views_db_operations::DAILY_VIEWS;
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

const SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'editor')),
            suspended INTEGER NOT NULL DEFAULT 0,
            is_master INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK(is_master = 0 OR role = 'admin')
        );
        CREATE UNIQUE INDEX IF NOT EXISTS users_single_master ON users(is_master) WHERE is_master = 1;",
    ),
    (
        "posts",
        "CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE CHECK(slug <> ''),
            excerpt TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK(status IN ('draft', 'submitted', 'published')),
            author_id TEXT NOT NULL REFERENCES users(id),
            assigned_to TEXT REFERENCES users(id),
            created_by TEXT NOT NULL REFERENCES users(id),
            submitted_at TEXT,
            approved_by TEXT REFERENCES users(id),
            approved_at TEXT,
            admin_note TEXT,
            published_at TEXT,
            trashed INTEGER NOT NULL DEFAULT 0,
            trashed_at TEXT,
            views INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK(status <> 'published' OR (approved_by IS NOT NULL AND published_at IS NOT NULL))
        );
        CREATE INDEX IF NOT EXISTS posts_status_idx ON posts(status, trashed);
        CREATE INDEX IF NOT EXISTS posts_author_idx ON posts(author_id);
        CREATE INDEX IF NOT EXISTS posts_assignee_idx ON posts(assigned_to);",
    ),
    (
        "tags",
        "CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE CHECK(slug <> '')
        );",
    ),
    (
        "post_tags",
        "CREATE TABLE IF NOT EXISTS post_tags (
            post_id TEXT NOT NULL REFERENCES posts(id),
            tag_id TEXT NOT NULL REFERENCES tags(id),
            PRIMARY KEY (post_id, tag_id)
        );
        CREATE INDEX IF NOT EXISTS post_tags_tag_idx ON post_tags(tag_id);",
    ),
    (
        "post_notes",
        "CREATE TABLE IF NOT EXISTS post_notes (
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL REFERENCES posts(id),
            author_id TEXT NOT NULL REFERENCES users(id),
            note TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS post_notes_post_idx ON post_notes(post_id, created_at);",
    ),
    // Notifications and invites outlive the users they mention.
    (
        "notifications",
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL CHECK(type IN ('assignment', 'submission', 'approval', 'note', 'edit')),
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            read_at TEXT
        );
        CREATE INDEX IF NOT EXISTS notifications_user_idx ON notifications(user_id, created_at);",
    ),
    (
        "invites",
        "CREATE TABLE IF NOT EXISTS invites (
            code TEXT PRIMARY KEY,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            used_by TEXT,
            used_at TEXT,
            expires_at TEXT
        );",
    ),
];

/// Creates every SQLite table and index. Safe to run against an existing
/// database.
pub fn setup_sqlite_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    for (table, ddl) in SCHEMA {
        log::info!("Creating '{}' table...", table);
        tx.execute_batch(ddl)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn setup_views_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        log::info!("Creating 'daily_views' table in Redb...");
        write_txn.open_table(DAILY_VIEWS)?;
    }
    write_txn.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_sqlite_db(&mut conn).unwrap();
        setup_sqlite_db(&mut conn).unwrap();
        let names = table_names(&conn);
        for expected in ["invites", "notifications", "post_notes", "post_tags", "posts", "tags", "users"] {
            assert!(names.iter().any(|n| n == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn only_one_master_row() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_sqlite_db(&mut conn).unwrap();
        let insert = "INSERT INTO users (id, email, display_name, password_hash, role, suspended, is_master, created_at)
                      VALUES (?1, ?2, 'x', 'h', 'admin', 0, 1, '2024-01-01')";
        conn.execute(insert, ["a", "a@example.com"]).unwrap();
        assert!(conn.execute(insert, ["b", "b@example.com"]).is_err());
    }
}
