use crate::models::db_operations::DbError;
use crate::models::{NewNotification, Notification, NotificationType};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

/// Inserts one row per pending notification inside a single transaction.
pub fn insert_notifications(
    conn: &mut Connection,
    batch: &[NewNotification],
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO notifications (id, user_id, type, payload, created_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
        )?;
        for item in batch {
            let payload = serde_json::to_string(&item.payload)?;
            stmt.execute(params![
                Uuid::new_v4().to_string(),
                item.user_id,
                item.kind,
                payload,
                now
            ])?;
        }
    }
    tx.commit()?;
    Ok(batch.len())
}

pub fn read_notifications_for_user(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
    limit: u32,
    offset: u32,
) -> Result<Vec<Notification>, DbError> {
    let sql = if unread_only {
        "SELECT id, user_id, type, payload, created_at, read_at FROM notifications
         WHERE user_id = ?1 AND read_at IS NULL ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
    } else {
        "SELECT id, user_id, type, payload, created_at, read_at FROM notifications
         WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![user_id, limit, offset], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, NotificationType>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
                row.get::<_, Option<DateTime<Utc>>>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, user_id, kind, payload, created_at, read_at)| {
            Ok(Notification {
                id,
                user_id,
                kind,
                payload: serde_json::from_str(&payload)?,
                created_at,
                read_at,
            })
        })
        .collect()
}

/// Sets `read_at` on the listed notifications that belong to `user_id` and
/// are still unread. Ids owned by anyone else are skipped.
pub fn mark_read(conn: &Connection, user_id: &str, ids: &[String], now: DateTime<Utc>) -> Result<usize, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL AND id IN ({})",
        placeholders
    );
    let mut values: Vec<&dyn ToSql> = vec![&now, &user_id];
    values.extend(ids.iter().map(|id| id as &dyn ToSql));
    Ok(conn.execute(&sql, params_from_iter(values))?)
}
