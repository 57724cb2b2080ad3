//! Editorial operations on posts.
//!
//! Every mutation runs inside an immediate SQLite transaction: the row is
//! loaded, the policy consulted, the transition rule planned and applied,
//! and the row written back before commit. Notifications owed by the change
//! are collected in an outbox and handed to the sink only after commit.

use crate::error::AppError;
use crate::helper::notification_helpers::{self, NotificationSink};
use crate::helper::sanitization_helpers::{post_slug, sanitize_markdown_content, strip_all_html};
use crate::lifecycle::{self, Action, Audience, Rule};
use crate::models::db_operations::posts_db_operations::{self, PostFilter, PostOrder};
use crate::models::db_operations::{tags_db_operations, users_db_operations, DbError};
use crate::models::{
    Caller, NewNotification, NewPost, NotificationType, Post, PostNote, PostPatch, PostStatus, Tag,
};
use crate::policy;
use crate::DbPool;
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::json;
use uuid::Uuid;

struct Committed<T> {
    value: T,
    outbox: Vec<NewNotification>,
}

fn in_write_tx<T>(
    pool: &DbPool,
    work: impl FnOnce(&Transaction) -> Result<Committed<T>, AppError>,
) -> Result<Committed<T>, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let committed = work(&tx)?;
    tx.commit()?;
    Ok(committed)
}

fn finish<T>(sink: &dyn NotificationSink, committed: Committed<T>) -> T {
    notification_helpers::dispatch(sink, committed.outbox);
    committed.value
}

fn load_post(conn: &Connection, post_id: &str) -> Result<Post, AppError> {
    posts_db_operations::read_post(conn, post_id)?
        .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
}

fn slug_conflict(slug: &str) -> impl FnOnce(DbError) -> AppError + '_ {
    move |e| match e {
        DbError::UniqueViolation(_) => AppError::Conflict(format!("slug '{}' is already in use", slug)),
        other => other.into(),
    }
}

fn resolve_tag_list(conn: &Connection, tag_ids: &[String]) -> Result<Vec<Tag>, AppError> {
    let mut unique: Vec<String> = Vec::with_capacity(tag_ids.len());
    for id in tag_ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    let (found, missing) = tags_db_operations::resolve_tags(conn, &unique)?;
    if !missing.is_empty() {
        return Err(AppError::invalid("tags", format!("unknown tag id(s): {}", missing.join(", "))));
    }
    Ok(found)
}

fn transition_outbox(
    conn: &Connection,
    rule: &Rule,
    post: &Post,
    actor: &Caller,
    extra: Option<serde_json::Value>,
) -> Result<Vec<NewNotification>, AppError> {
    let Some(kind) = rule.notification else {
        return Ok(Vec::new());
    };
    let admin_ids = if rule.notify == Audience::AdminsExceptActor {
        users_db_operations::read_admin_ids(conn)?
    } else {
        Vec::new()
    };
    let recipients = lifecycle::recipients(rule, post, actor, &admin_ids);
    Ok(notification_helpers::for_post(kind, post, actor, recipients, extra))
}

/// Policy checks that depend on which table action a status change maps to.
fn authorize_action(caller: &Caller, post: &Post, action: Action) -> Result<(), AppError> {
    match action {
        Action::Submit => policy::can_submit(caller, post),
        Action::Publish => policy::can_publish(caller),
        Action::ReturnToDraft => policy::can_return_to_draft(caller),
        Action::Assign => policy::can_assign(caller),
    }
    .into_result()
}

fn clean_note(note: &str) -> Option<String> {
    let cleaned = strip_all_html(note.trim());
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn create_post(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    new: NewPost,
) -> Result<Post, AppError> {
    policy::can_act(caller).into_result()?;
    let requested = new.status.unwrap_or(PostStatus::Draft);
    if requested == PostStatus::Published {
        policy::can_publish(caller).into_result()?;
    }

    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    let slug = post_slug(new.slug.as_deref(), &new.title, &id);
    let mut post = Post {
        id,
        title: strip_all_html(new.title.trim()),
        slug,
        excerpt: strip_all_html(new.excerpt.trim()),
        content: sanitize_markdown_content(&new.content),
        status: PostStatus::Draft,
        author_id: caller.id.clone(),
        assigned_to: None,
        created_by: caller.id.clone(),
        submitted_at: None,
        approved_by: None,
        approved_at: None,
        admin_note: None,
        published_at: None,
        trashed: false,
        trashed_at: None,
        views: 0,
        created_at: now,
        updated_at: now,
        tags: Vec::new(),
    };

    let committed = in_write_tx(pool, |tx| {
        post.tags = resolve_tag_list(tx, &new.tag_ids)?;
        let mut outbox = Vec::new();
        if requested != PostStatus::Draft {
            let action = lifecycle::action_for_status(requested);
            authorize_action(caller, &post, action)?;
            let rule = lifecycle::plan(&post, action)?;
            if requested == PostStatus::Published {
                post.published_at = new.published_at;
            }
            lifecycle::apply(rule, &mut post, caller, now);
            outbox = transition_outbox(tx, rule, &post, caller, None)?;
        }
        posts_db_operations::insert_post(tx, &post).map_err(slug_conflict(&post.slug))?;
        Ok(Committed { value: post.clone(), outbox })
    })?;
    log::info!("Post {} created by {}", committed.value.id, caller.id);
    Ok(finish(sink, committed))
}

pub fn get_post(pool: &DbPool, caller: &Caller, post_id: &str) -> Result<Post, AppError> {
    let conn = pool.get()?;
    let post = load_post(&conn, post_id)?;
    policy::can_view_post(caller, &post).into_result()?;
    Ok(post)
}

/// Posts the caller authored or is assigned to, trash excluded.
pub fn list_my_posts(pool: &DbPool, caller: &Caller, limit: u32, offset: u32) -> Result<Vec<Post>, AppError> {
    policy::can_act(caller).into_result()?;
    let conn = pool.get()?;
    let filter = PostFilter {
        involving_user: Some(caller.id.clone()),
        trashed: Some(false),
        ..PostFilter::default()
    };
    Ok(posts_db_operations::list_posts(&conn, &filter, PostOrder::UpdatedDesc, limit, offset)?)
}

pub fn edit_post(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
    patch: PostPatch,
) -> Result<Post, AppError> {
    let now = Utc::now();
    let committed = in_write_tx(pool, |tx| {
        let current = load_post(tx, post_id)?;
        policy::can_edit_post(caller, &current).into_result()?;
        if patch.admin_note.is_some() {
            policy::can_assign(caller).into_result()?;
        }
        if patch.is_empty() {
            return Err(AppError::invalid("patch", "nothing to update"));
        }

        let mut next = current.clone();
        let mut changed: Vec<&str> = Vec::new();
        if let Some(title) = &patch.title {
            next.title = strip_all_html(title.trim());
            changed.push("title");
        }
        if let Some(slug) = &patch.slug {
            next.slug = post_slug(Some(slug), &next.title, &next.id);
            changed.push("slug");
        }
        if let Some(excerpt) = &patch.excerpt {
            next.excerpt = strip_all_html(excerpt.trim());
            changed.push("excerpt");
        }
        if let Some(content) = &patch.content {
            next.content = sanitize_markdown_content(content);
            changed.push("content");
        }
        if let Some(tag_ids) = &patch.tag_ids {
            next.tags = resolve_tag_list(tx, tag_ids)?;
            changed.push("tags");
        }
        if let Some(note) = &patch.admin_note {
            next.admin_note = clean_note(note);
            changed.push("admin_note");
        }
        next.updated_at = now;

        let mut outbox = Vec::new();
        if let Some(target) = patch.status.filter(|s| *s != current.status) {
            let action = lifecycle::action_for_status(target);
            authorize_action(caller, &current, action)?;
            let rule = lifecycle::plan(&next, action)?;
            lifecycle::apply(rule, &mut next, caller, now);
            outbox = transition_outbox(tx, rule, &next, caller, None)?;
            changed.push("status");
        }

        posts_db_operations::update_post(tx, &next).map_err(slug_conflict(&next.slug))?;

        if caller.is_admin() && !next.is_author(&caller.id) {
            outbox.extend(notification_helpers::for_post(
                NotificationType::Edit,
                &next,
                caller,
                [next.author_id.clone()],
                Some(json!({ "fields": changed })),
            ));
        }
        Ok(Committed { value: next, outbox })
    })?;
    Ok(finish(sink, committed))
}

pub fn submit_post(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
) -> Result<Post, AppError> {
    run_transition(pool, sink, caller, post_id, Action::Submit)
}

/// Publishing is allowed from any status, including re-publishing.
pub fn publish_post(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
) -> Result<Post, AppError> {
    run_transition(pool, sink, caller, post_id, Action::Publish)
}

fn run_transition(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
    action: Action,
) -> Result<Post, AppError> {
    let now = Utc::now();
    let committed = in_write_tx(pool, |tx| {
        let mut post = load_post(tx, post_id)?;
        authorize_action(caller, &post, action)?;
        let rule = lifecycle::plan(&post, action)?;
        lifecycle::apply(rule, &mut post, caller, now);
        posts_db_operations::update_post(tx, &post)?;
        let outbox = transition_outbox(tx, rule, &post, caller, None)?;
        Ok(Committed { value: post, outbox })
    })?;
    log::info!("Post {} moved to {} by {}", post_id, committed.value.status, caller.id);
    Ok(finish(sink, committed))
}

/// Hands the post to `assignee_id`. Re-assigning the same user is allowed
/// and re-sends the notification.
pub fn assign_post(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
    assignee_id: &str,
    admin_note: Option<&str>,
) -> Result<Post, AppError> {
    let now = Utc::now();
    let committed = in_write_tx(pool, |tx| {
        let mut post = load_post(tx, post_id)?;
        authorize_action(caller, &post, Action::Assign)?;
        let assignee = users_db_operations::read_user(tx, assignee_id)?
            .ok_or_else(|| AppError::invalid("assignee_id", "no such user"))?;
        if assignee.suspended {
            return Err(AppError::invalid("assignee_id", "cannot assign to a suspended user"));
        }
        let rule = lifecycle::plan(&post, Action::Assign)?;

        post.assigned_to = Some(assignee.id.clone());
        if let Some(note) = admin_note.and_then(clean_note) {
            post.admin_note = Some(note);
        }
        lifecycle::apply(rule, &mut post, caller, now);
        posts_db_operations::update_post(tx, &post)?;

        let extra = post.admin_note.as_ref().map(|note| json!({ "admin_note": note }));
        let outbox = transition_outbox(tx, rule, &post, caller, extra)?;
        Ok(Committed { value: post, outbox })
    })?;
    log::info!("Post {} assigned to {} by {}", post_id, assignee_id, caller.id);
    Ok(finish(sink, committed))
}

fn set_trashed(pool: &DbPool, caller: &Caller, post_id: &str, trashed: bool) -> Result<Post, AppError> {
    let now = Utc::now();
    let committed = in_write_tx(pool, |tx| {
        let mut post = load_post(tx, post_id)?;
        policy::can_trash(caller).into_result()?;
        post.trashed = trashed;
        post.trashed_at = if trashed { Some(now) } else { None };
        post.updated_at = now;
        posts_db_operations::update_post(tx, &post)?;
        Ok(Committed { value: post, outbox: Vec::new() })
    })?;
    Ok(committed.value)
}

/// Soft delete. The status is preserved for a later restore.
pub fn trash_post(pool: &DbPool, caller: &Caller, post_id: &str) -> Result<Post, AppError> {
    set_trashed(pool, caller, post_id, true)
}

pub fn restore_post(pool: &DbPool, caller: &Caller, post_id: &str) -> Result<Post, AppError> {
    set_trashed(pool, caller, post_id, false)
}

/// Hard delete. Admins always; authors only for their unassigned drafts.
pub fn delete_post(pool: &DbPool, caller: &Caller, post_id: &str) -> Result<(), AppError> {
    in_write_tx(pool, |tx| {
        let post = load_post(tx, post_id)?;
        policy::can_delete_post(caller, &post).into_result()?;
        posts_db_operations::delete_post(tx, post_id)?;
        Ok(Committed { value: (), outbox: Vec::new() })
    })?;
    log::info!("Post {} deleted by {}", post_id, caller.id);
    Ok(())
}

/// Appends a note and tells every admin and the author, minus the writer.
pub fn add_note(
    pool: &DbPool,
    sink: &dyn NotificationSink,
    caller: &Caller,
    post_id: &str,
    text: &str,
) -> Result<PostNote, AppError> {
    let committed = in_write_tx(pool, |tx| {
        let post = load_post(tx, post_id)?;
        policy::can_add_note(caller, &post).into_result()?;
        let cleaned = clean_note(text).ok_or_else(|| AppError::invalid("note", "note cannot be empty"))?;
        let note = PostNote {
            id: Uuid::new_v4().to_string(),
            post_id: post.id.clone(),
            author_id: caller.id.clone(),
            note: cleaned,
            created_at: Utc::now(),
        };
        posts_db_operations::insert_note(tx, &note)?;

        let recipients = users_db_operations::read_admin_ids(tx)?
            .into_iter()
            .chain(std::iter::once(post.author_id.clone()))
            .filter(|id| *id != caller.id);
        let outbox = notification_helpers::for_post(
            NotificationType::Note,
            &post,
            caller,
            recipients,
            Some(json!({ "note_id": note.id })),
        );
        Ok(Committed { value: note, outbox })
    })?;
    Ok(finish(sink, committed))
}

pub fn list_notes(pool: &DbPool, caller: &Caller, post_id: &str) -> Result<Vec<PostNote>, AppError> {
    let conn = pool.get()?;
    let post = load_post(&conn, post_id)?;
    policy::can_view_post(caller, &post).into_result()?;
    Ok(posts_db_operations::read_notes(&conn, post_id)?)
}

// --- Review queues ---

fn admin_listing(
    pool: &DbPool,
    caller: &Caller,
    filter: PostFilter,
    order: PostOrder,
    limit: u32,
    offset: u32,
) -> Result<Vec<Post>, AppError> {
    policy::can_review_queue(caller).into_result()?;
    let conn = pool.get()?;
    Ok(posts_db_operations::list_posts(&conn, &filter, order, limit, offset)?)
}

/// Submitted, untrashed posts, most recently submitted first.
pub fn pending_queue(pool: &DbPool, caller: &Caller, limit: u32, offset: u32) -> Result<Vec<Post>, AppError> {
    let filter = PostFilter {
        status: Some(PostStatus::Submitted),
        trashed: Some(false),
        ..PostFilter::default()
    };
    admin_listing(pool, caller, filter, PostOrder::SubmittedDesc, limit, offset)
}

/// Assigned drafts that are still being worked on.
pub fn in_progress(pool: &DbPool, caller: &Caller, limit: u32, offset: u32) -> Result<Vec<Post>, AppError> {
    let filter = PostFilter {
        status: Some(PostStatus::Draft),
        assigned: Some(true),
        trashed: Some(false),
        ..PostFilter::default()
    };
    admin_listing(pool, caller, filter, PostOrder::UpdatedDesc, limit, offset)
}

pub fn trashed_posts(pool: &DbPool, caller: &Caller, limit: u32, offset: u32) -> Result<Vec<Post>, AppError> {
    let filter = PostFilter {
        trashed: Some(true),
        ..PostFilter::default()
    };
    admin_listing(pool, caller, filter, PostOrder::TrashedDesc, limit, offset)
}
