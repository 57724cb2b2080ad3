use crate::models::db_operations::DbError;
use crate::models::{Invite, Role, User};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, email, display_name, role, suspended, is_master, created_at";

fn map_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
        suspended: row.get(4)?,
        is_master: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_user(conn: &Connection, user: &User, password_hash: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO users (id, email, display_name, password_hash, role, suspended, is_master, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id,
            user.email,
            user.display_name,
            password_hash,
            user.role,
            user.suspended,
            user.is_master,
            user.created_at
        ],
    )?;
    Ok(())
}

pub fn count_users(conn: &Connection) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn read_user(conn: &Connection, user_id: &str) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [user_id], map_user_row).optional()?)
}

/// Returns the user together with the stored bcrypt hash, for login checks.
pub fn read_credentials(conn: &Connection, email: &str) -> Result<Option<(User, String)>, DbError> {
    let sql = format!("SELECT {}, password_hash FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, [email], |row| Ok((map_user_row(row)?, row.get(7)?)))
        .optional()?)
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, DbError> {
    let sql = format!("SELECT {} FROM users ORDER BY created_at, id", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], map_user_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Ids of every admin, suspended or not.
pub fn read_admin_ids(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE role = 'admin' ORDER BY created_at, id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub fn update_role(conn: &Connection, user_id: &str, role: Role) -> Result<(), DbError> {
    let changed = conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", params![role, user_id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub fn update_suspended(conn: &Connection, user_id: &str, suspended: bool) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE users SET suspended = ?1 WHERE id = ?2",
        params![suspended, user_id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub fn delete_user(conn: &Connection, user_id: &str) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?)
}

// --- Invites ---

fn map_invite_row(row: &Row) -> rusqlite::Result<Invite> {
    Ok(Invite {
        code: row.get(0)?,
        created_by: row.get(1)?,
        created_at: row.get(2)?,
        used_by: row.get(3)?,
        used_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

pub fn create_invite(conn: &Connection, invite: &Invite) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO invites (code, created_by, created_at, used_by, used_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            invite.code,
            invite.created_by,
            invite.created_at,
            invite.used_by,
            invite.used_at,
            invite.expires_at
        ],
    )?;
    Ok(())
}

pub fn read_invite(conn: &Connection, code: &str) -> Result<Option<Invite>, DbError> {
    Ok(conn
        .query_row(
            "SELECT code, created_by, created_at, used_by, used_at, expires_at FROM invites WHERE code = ?1",
            [code],
            map_invite_row,
        )
        .optional()?)
}

pub fn read_all_invites(conn: &Connection) -> Result<Vec<Invite>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT code, created_by, created_at, used_by, used_at, expires_at FROM invites ORDER BY created_at DESC",
    )?;
    let invites = stmt
        .query_map([], map_invite_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(invites)
}

/// Marks an unused invite as consumed. Returns 0 when the code was already
/// used or does not exist, so two signups racing on one code cannot both win.
pub fn consume_invite(conn: &Connection, code: &str, user_id: &str, now: DateTime<Utc>) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE invites SET used_by = ?1, used_at = ?2 WHERE code = ?3 AND used_by IS NULL",
        params![user_id, now, code],
    )?)
}

pub fn delete_unused_invite(conn: &Connection, code: &str) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM invites WHERE code = ?1 AND used_by IS NULL", [code])?)
}
