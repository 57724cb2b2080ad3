use crate::error::AppError;
use crate::helper::sanitization_helpers::{slugify, strip_all_html};
use crate::models::db_operations::{
    posts_db_operations, tags_db_operations, users_db_operations, views_db_operations, DbError,
};
use crate::models::{Caller, Invite, Role, Tag, User};
use crate::policy;
use crate::DbPool;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use redb::Database;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

pub const INVITE_CODE_LENGTH: usize = 16;

fn load_user(conn: &Connection, user_id: &str) -> Result<User, AppError> {
    users_db_operations::read_user(conn, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
}

// --- Users ---

pub fn list_users(pool: &DbPool, caller: &Caller) -> Result<Vec<User>, AppError> {
    policy::can_manage_users(caller).into_result()?;
    let conn = pool.get()?;
    Ok(users_db_operations::read_all_users(&conn)?)
}

pub fn change_role(pool: &DbPool, caller: &Caller, target_id: &str, role: Role) -> Result<User, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut target = load_user(&tx, target_id)?;
    policy::can_mutate_user(caller, &target).into_result()?;
    users_db_operations::update_role(&tx, target_id, role)?;
    tx.commit()?;
    log::info!("User {} role set to {} by {}", target_id, role.as_str(), caller.id);
    target.role = role;
    Ok(target)
}

/// Takes effect on the target's next authenticated request, where the
/// session extractor re-reads the row and drops the session.
pub fn set_suspended(pool: &DbPool, caller: &Caller, target_id: &str, suspended: bool) -> Result<User, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut target = load_user(&tx, target_id)?;
    policy::can_mutate_user(caller, &target).into_result()?;
    users_db_operations::update_suspended(&tx, target_id, suspended)?;
    tx.commit()?;
    log::info!("User {} suspended={} by {}", target_id, suspended, caller.id);
    target.suspended = suspended;
    Ok(target)
}

/// Moves every post reference from the target to `transfer_to`, then
/// removes the target. Nothing changes unless all of it succeeds.
pub fn delete_user(
    pool: &DbPool,
    caller: &Caller,
    target_id: &str,
    transfer_to: Option<&str>,
) -> Result<usize, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let target = load_user(&tx, target_id)?;
    policy::can_mutate_user(caller, &target).into_result()?;

    let transfer_to = transfer_to
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::invalid("transfer_to", "a transfer target is required"))?;
    if transfer_to == target.id {
        return Err(AppError::invalid("transfer_to", "cannot transfer posts to the user being deleted"));
    }
    if users_db_operations::read_user(&tx, transfer_to)?.is_none() {
        return Err(AppError::invalid("transfer_to", "no such user"));
    }

    let moved = posts_db_operations::reassign_user_posts(&tx, &target.id, transfer_to)?;
    users_db_operations::delete_user(&tx, &target.id)?;
    tx.commit()?;
    log::info!(
        "User {} deleted by {}; {} post(s) transferred to {}",
        target.id,
        caller.id,
        moved,
        transfer_to
    );
    Ok(moved)
}

// --- Tags ---

fn tag_fields(name: &str, slug: Option<&str>) -> Result<(String, String), AppError> {
    let name = strip_all_html(name.trim());
    if name.is_empty() {
        return Err(AppError::invalid("name", "tag name cannot be empty"));
    }
    let slug = slugify(slug.filter(|s| !s.trim().is_empty()).unwrap_or(&name));
    if slug.is_empty() {
        return Err(AppError::invalid("slug", "tag slug must contain letters or digits"));
    }
    Ok((name, slug))
}

fn tag_conflict(e: DbError) -> AppError {
    match e {
        DbError::UniqueViolation(_) => AppError::Conflict("a tag with this name or slug already exists".to_string()),
        other => other.into(),
    }
}

pub fn list_tags(pool: &DbPool) -> Result<Vec<Tag>, AppError> {
    let conn = pool.get()?;
    Ok(tags_db_operations::read_all_tags(&conn)?)
}

pub fn create_tag(pool: &DbPool, caller: &Caller, name: &str, slug: Option<&str>) -> Result<Tag, AppError> {
    policy::can_manage_tags(caller).into_result()?;
    let (name, slug) = tag_fields(name, slug)?;
    let tag = Tag { id: Uuid::new_v4().to_string(), name, slug };
    let conn = pool.get()?;
    tags_db_operations::create_tag(&conn, &tag).map_err(tag_conflict)?;
    Ok(tag)
}

pub fn update_tag(
    pool: &DbPool,
    caller: &Caller,
    tag_id: &str,
    name: &str,
    slug: Option<&str>,
) -> Result<Tag, AppError> {
    policy::can_manage_tags(caller).into_result()?;
    let (name, slug) = tag_fields(name, slug)?;
    let tag = Tag { id: tag_id.to_string(), name, slug };
    let conn = pool.get()?;
    tags_db_operations::update_tag(&conn, &tag).map_err(tag_conflict)?;
    Ok(tag)
}

pub fn delete_tag(pool: &DbPool, caller: &Caller, tag_id: &str) -> Result<(), AppError> {
    policy::can_manage_tags(caller).into_result()?;
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    if tags_db_operations::delete_tag(&tx, tag_id)? == 0 {
        return Err(AppError::NotFound(format!("tag {}", tag_id)));
    }
    tx.commit()?;
    Ok(())
}

// --- Invites ---

fn generate_invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LENGTH)
        .map(char::from)
        .collect()
}

pub fn create_invite(pool: &DbPool, caller: &Caller, expires_in_days: Option<u32>) -> Result<Invite, AppError> {
    policy::can_manage_invites(caller).into_result()?;
    let now = Utc::now();
    let expires_at = match expires_in_days {
        Some(days) => Some(
            now.checked_add_signed(Duration::days(i64::from(days)))
                .ok_or_else(|| AppError::invalid("expires_in_days", "expiry is too far in the future"))?,
        ),
        None => None,
    };
    let invite = Invite {
        code: generate_invite_code(),
        created_by: caller.id.clone(),
        created_at: now,
        used_by: None,
        used_at: None,
        expires_at,
    };
    let conn = pool.get()?;
    users_db_operations::create_invite(&conn, &invite)?;
    Ok(invite)
}

pub fn list_invites(pool: &DbPool, caller: &Caller) -> Result<Vec<Invite>, AppError> {
    policy::can_manage_invites(caller).into_result()?;
    let conn = pool.get()?;
    Ok(users_db_operations::read_all_invites(&conn)?)
}

/// Deletes an invite that has not been used yet.
pub fn revoke_invite(pool: &DbPool, caller: &Caller, code: &str) -> Result<(), AppError> {
    policy::can_manage_invites(caller).into_result()?;
    let conn = pool.get()?;
    if users_db_operations::delete_unused_invite(&conn, code)? == 1 {
        return Ok(());
    }
    match users_db_operations::read_invite(&conn, code)? {
        Some(_) => Err(AppError::Conflict("invite has already been used".to_string())),
        None => Err(AppError::NotFound(format!("invite {}", code))),
    }
}

// --- View statistics ---

#[derive(Debug, Serialize)]
pub struct DailyViews {
    pub day: String,
    pub views: u64,
}

/// Daily view counts for the last `days` days, oldest first.
pub fn post_daily_views(
    pool: &DbPool,
    views_db: &Database,
    caller: &Caller,
    post_id: &str,
    days: u32,
) -> Result<Vec<DailyViews>, AppError> {
    policy::can_review_queue(caller).into_result()?;
    let conn = pool.get()?;
    if posts_db_operations::read_post(&conn, post_id)?.is_none() {
        return Err(AppError::NotFound(format!("post {}", post_id)));
    }
    let today = views_db_operations::day_number(Utc::now());
    let from = today - i64::from(days.max(1)) + 1;
    let counts = views_db_operations::read_daily_views(views_db, post_id, from, today)?;
    Ok(counts
        .into_iter()
        .filter_map(|(day, views)| {
            chrono::DateTime::<Utc>::from_timestamp(day * 86_400, 0)
                .map(|at| DailyViews { day: at.format("%Y-%m-%d").to_string(), views })
        })
        .collect())
}
