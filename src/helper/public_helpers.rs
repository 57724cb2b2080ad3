use crate::error::AppError;
use crate::helper::sanitization_helpers::strip_all_html;
use crate::models::db_operations::posts_db_operations::{self, PostFilter, PostOrder};
use crate::models::db_operations::{users_db_operations, views_db_operations, DbError};
use crate::models::{PostStatus, PublicPost, Role, User};
use crate::DbPool;
use chrono::Utc;
use redb::Database;
use rusqlite::TransactionBehavior;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn list_published(
    pool: &DbPool,
    tag_slug: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<PublicPost>, AppError> {
    let conn = pool.get()?;
    let filter = PostFilter {
        status: Some(PostStatus::Published),
        trashed: Some(false),
        tag_slug: tag_slug.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()),
        ..PostFilter::default()
    };
    let posts = posts_db_operations::list_posts(&conn, &filter, PostOrder::PublishedDesc, limit, offset)?;
    Ok(posts.into_iter().map(PublicPost::from).collect())
}

/// Drafts, submissions and trashed posts look exactly like missing ones.
pub fn get_published_by_slug(pool: &DbPool, slug: &str) -> Result<PublicPost, AppError> {
    let conn = pool.get()?;
    posts_db_operations::read_post_by_slug(&conn, slug)?
        .filter(|post| post.status == PostStatus::Published && !post.trashed)
        .map(PublicPost::from)
        .ok_or_else(|| AppError::NotFound(format!("post '{}'", slug)))
}

/// Bumps the post's counter and today's aggregate. The aggregate is
/// secondary: a redb failure is logged and the count still stands.
pub fn record_view(pool: &DbPool, views_db: &Database, post_id: &str) -> Result<(), AppError> {
    let conn = pool.get()?;
    if posts_db_operations::increment_views(&conn, post_id)? == 0 {
        return Err(AppError::NotFound(format!("post {}", post_id)));
    }
    let today = views_db_operations::day_number(Utc::now());
    if let Err(e) = views_db_operations::record_daily_view(views_db, post_id, today) {
        log::warn!("Failed to record daily view for post {}: {}", post_id, e);
    }
    Ok(())
}

/// Drops the aggregate rows of a post that no longer exists.
pub fn forget_views(views_db: &Database, post_id: &str) {
    if let Err(e) = views_db_operations::delete_post_views(views_db, post_id) {
        log::warn!("Failed to drop view aggregates for post {}: {}", post_id, e);
    }
}

pub struct Registration<'a> {
    pub email: &'a str,
    pub display_name: &'a str,
    pub password: &'a str,
    pub invite_code: Option<&'a str>,
}

fn validate_registration(reg: &Registration<'_>) -> Result<(String, String), AppError> {
    let mut fields = crate::error::FieldErrors::new();
    let email = reg.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        fields.insert("email".to_string(), "a valid email address is required".to_string());
    }
    let display_name = strip_all_html(reg.display_name.trim());
    if display_name.is_empty() {
        fields.insert("display_name".to_string(), "display name cannot be empty".to_string());
    }
    if reg.password.chars().count() < MIN_PASSWORD_LENGTH {
        fields.insert(
            "password".to_string(),
            format!("password must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
    if fields.is_empty() {
        Ok((email, display_name))
    } else {
        Err(AppError::Validation(fields))
    }
}

/// Creates a staff account. The very first account becomes the master
/// admin and needs no invite; every later one consumes an invite in the
/// same transaction that inserts the user.
pub fn register_user(pool: &DbPool, reg: Registration<'_>, bcrypt_cost: u32) -> Result<User, AppError> {
    let (email, display_name) = validate_registration(&reg)?;
    let password_hash = bcrypt::hash(reg.password, bcrypt_cost)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;

    let now = Utc::now();
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let first = users_db_operations::count_users(&tx)? == 0;
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        display_name,
        role: if first { Role::Admin } else { Role::Editor },
        suspended: false,
        is_master: first,
        created_at: now,
    };

    users_db_operations::create_user(&tx, &user, &password_hash).map_err(|e| match e {
        DbError::UniqueViolation(_) => AppError::Conflict("an account with this email already exists".to_string()),
        other => other.into(),
    })?;

    if !first {
        let code = reg
            .invite_code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::invalid("invite_code", "an invite code is required"))?;
        let usable = users_db_operations::read_invite(&tx, code)?
            .map_or(false, |invite| invite.is_usable(now));
        if !usable || users_db_operations::consume_invite(&tx, code, &user.id, now)? != 1 {
            return Err(AppError::invalid("invite_code", "invite code is invalid, used, or expired"));
        }
    }
    tx.commit()?;

    if first {
        log::info!("Master administrator {} registered", user.id);
    } else {
        log::info!("User {} registered", user.id);
    }
    Ok(user)
}

/// Checks an email/password pair. Unknown emails and wrong passwords are
/// indistinguishable to the caller.
pub fn verify_credentials(pool: &DbPool, email: &str, password: &str) -> Result<User, AppError> {
    let conn = pool.get()?;
    let email = email.trim().to_lowercase();
    let Some((user, hash)) = users_db_operations::read_credentials(&conn, &email)? else {
        return Err(AppError::Unauthorized);
    };
    match bcrypt::verify(password, &hash) {
        Ok(true) if user.suspended => {
            log::warn!("Login refused for suspended user {}", user.id);
            Err(AppError::Suspended)
        }
        Ok(true) => Ok(user),
        Ok(false) => Err(AppError::Unauthorized),
        Err(e) => {
            log::error!("Stored password hash for user {} is unreadable: {}", user.id, e);
            Err(AppError::Unauthorized)
        }
    }
}
