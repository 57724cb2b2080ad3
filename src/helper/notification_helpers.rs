use crate::error::AppError;
use crate::models::db_operations::{notifications_db_operations, DbError};
use crate::models::{Caller, NewNotification, Notification, NotificationType, Post};
use crate::DbPool;
use chrono::Utc;
use serde_json::json;

/// Where fanned-out notifications are written. Delivery runs after the
/// triggering transition has committed and its failures never reach the
/// caller.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, batch: &[NewNotification]) -> Result<(), DbError>;
}

/// Writes notifications into the `notifications` table.
pub struct DbNotificationSink {
    pool: DbPool,
}

impl DbNotificationSink {
    pub fn new(pool: DbPool) -> Self {
        DbNotificationSink { pool }
    }
}

impl NotificationSink for DbNotificationSink {
    fn deliver(&self, batch: &[NewNotification]) -> Result<(), DbError> {
        let mut conn = self.pool.get()?;
        notifications_db_operations::insert_notifications(&mut conn, batch, Utc::now())?;
        Ok(())
    }
}

/// Builds one notification per recipient, all sharing the post payload.
pub fn for_post(
    kind: NotificationType,
    post: &Post,
    actor: &Caller,
    recipients: impl IntoIterator<Item = String>,
    extra: Option<serde_json::Value>,
) -> Vec<NewNotification> {
    let mut payload = json!({
        "post_id": post.id,
        "title": post.title,
        "status": post.status,
        "actor_id": actor.id,
    });
    if let (Some(serde_json::Value::Object(extra)), Some(map)) = (extra, payload.as_object_mut()) {
        map.extend(extra);
    }
    let mut seen: Vec<String> = Vec::new();
    recipients
        .into_iter()
        .filter(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(id.clone());
                true
            }
        })
        .map(|user_id| NewNotification { user_id, kind, payload: payload.clone() })
        .collect()
}

/// Best-effort fan-out: errors are logged and swallowed.
pub fn dispatch(sink: &dyn NotificationSink, batch: Vec<NewNotification>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = sink.deliver(&batch) {
        log::warn!(
            "Failed to deliver {} notification(s) of type {}: {}",
            batch.len(),
            batch[0].kind.as_str(),
            e
        );
    }
}

pub fn list_notifications(
    pool: &DbPool,
    caller: &Caller,
    unread_only: bool,
    limit: u32,
    offset: u32,
) -> Result<Vec<Notification>, AppError> {
    crate::policy::can_act(caller).into_result()?;
    let conn = pool.get()?;
    Ok(notifications_db_operations::read_notifications_for_user(
        &conn, &caller.id, unread_only, limit, offset,
    )?)
}

/// Marks the caller's own notifications read; ids owned by anyone else are
/// silently ignored. Returns how many were marked.
pub fn mark_read(pool: &DbPool, caller: &Caller, ids: &[String]) -> Result<usize, AppError> {
    crate::policy::can_act(caller).into_result()?;
    let conn = pool.get()?;
    Ok(notifications_db_operations::mark_read(&conn, &caller.id, ids, Utc::now())?)
}
