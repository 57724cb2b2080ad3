use crate::error::AppError;
use crate::helper::notification_helpers::NotificationSink;
use crate::helper::{admin_helpers, post_helpers};
use crate::middleware::AuthenticatedStaff;
use crate::models::Role;
use crate::routes::{created_json, ok_empty, ok_json, PageQuery};
use crate::DbPool;
use actix_web::{web, HttpResponse};
use redb::Database;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_VIEW_DAYS: u32 = 30;
const MAX_VIEW_DAYS: u32 = 366;

#[derive(Deserialize)]
pub struct AssignRequest {
    assignee_id: String,
    admin_note: Option<String>,
}

#[derive(Deserialize)]
pub struct ViewsQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
pub struct TagRequest {
    name: String,
    slug: Option<String>,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    role: Role,
}

#[derive(Deserialize)]
pub struct SuspensionRequest {
    suspended: bool,
}

#[derive(Deserialize)]
pub struct DeleteUserQuery {
    transfer_to: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct InviteRequest {
    expires_in_days: Option<u32>,
}

/// Administrator routes, mounted under `/management/api/admin`. Every
/// handler re-checks the caller's role through the policy layer.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/posts/{id}/publish", web::post().to(publish_post))
            .route("/posts/{id}/assign", web::post().to(assign_post))
            .route("/posts/{id}/trash", web::post().to(trash_post))
            .route("/posts/{id}/restore", web::post().to(restore_post))
            .route("/posts/{id}/views", web::get().to(post_views))
            .route("/queue/pending", web::get().to(pending_queue))
            .route("/queue/in-progress", web::get().to(in_progress))
            .route("/queue/trash", web::get().to(trash_listing))
            .route("/tags", web::get().to(list_tags))
            .route("/tags", web::post().to(create_tag))
            .route("/tags/{id}", web::put().to(update_tag))
            .route("/tags/{id}", web::delete().to(delete_tag))
            .route("/users", web::get().to(list_users))
            .route("/users/{id}/role", web::put().to(change_role))
            .route("/users/{id}/suspension", web::put().to(set_suspension))
            .route("/users/{id}", web::delete().to(delete_user))
            .route("/invites", web::get().to(list_invites))
            .route("/invites", web::post().to(create_invite))
            .route("/invites/{code}", web::delete().to(revoke_invite)),
    );
}

// --- Posts ---

async fn publish_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::publish_post(&pool, sink.get_ref(), &staff.caller(), &id)?))
}

async fn assign_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    id: web::Path<String>,
    body: web::Json<AssignRequest>,
) -> Result<HttpResponse, AppError> {
    let post = post_helpers::assign_post(
        &pool,
        sink.get_ref(),
        &staff.caller(),
        &id,
        &body.assignee_id,
        body.admin_note.as_deref(),
    )?;
    Ok(ok_json(post))
}

async fn trash_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::trash_post(&pool, &staff.caller(), &id)?))
}

async fn restore_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::restore_post(&pool, &staff.caller(), &id)?))
}

async fn post_views(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    views_db: web::Data<Database>,
    id: web::Path<String>,
    query: web::Query<ViewsQuery>,
) -> Result<HttpResponse, AppError> {
    let days = query.days.unwrap_or(DEFAULT_VIEW_DAYS).min(MAX_VIEW_DAYS);
    let counts = admin_helpers::post_daily_views(&pool, &views_db, &staff.caller(), &id, days)?;
    Ok(ok_json(counts))
}

// --- Review queues ---

async fn pending_queue(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::pending_queue(&pool, &staff.caller(), page.limit(), page.offset())?))
}

async fn in_progress(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::in_progress(&pool, &staff.caller(), page.limit(), page.offset())?))
}

async fn trash_listing(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::trashed_posts(&pool, &staff.caller(), page.limit(), page.offset())?))
}

// --- Tags ---

async fn list_tags(_staff: AuthenticatedStaff, pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::list_tags(&pool)?))
}

async fn create_tag(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    body: web::Json<TagRequest>,
) -> Result<HttpResponse, AppError> {
    let tag = admin_helpers::create_tag(&pool, &staff.caller(), &body.name, body.slug.as_deref())?;
    Ok(created_json(tag))
}

async fn update_tag(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    body: web::Json<TagRequest>,
) -> Result<HttpResponse, AppError> {
    let tag = admin_helpers::update_tag(&pool, &staff.caller(), &id, &body.name, body.slug.as_deref())?;
    Ok(ok_json(tag))
}

async fn delete_tag(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    admin_helpers::delete_tag(&pool, &staff.caller(), &id)?;
    Ok(ok_empty())
}

// --- Users ---

async fn list_users(staff: AuthenticatedStaff, pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::list_users(&pool, &staff.caller())?))
}

async fn change_role(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    body: web::Json<RoleRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::change_role(&pool, &staff.caller(), &id, body.role)?))
}

async fn set_suspension(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    body: web::Json<SuspensionRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::set_suspended(&pool, &staff.caller(), &id, body.suspended)?))
}

async fn delete_user(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    query: web::Query<DeleteUserQuery>,
) -> Result<HttpResponse, AppError> {
    let moved = admin_helpers::delete_user(&pool, &staff.caller(), &id, query.transfer_to.as_deref())?;
    Ok(ok_json(json!({ "transferred_posts": moved })))
}

// --- Invites ---

async fn list_invites(staff: AuthenticatedStaff, pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::list_invites(&pool, &staff.caller())?))
}

async fn create_invite(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    body: Option<web::Json<InviteRequest>>,
) -> Result<HttpResponse, AppError> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let invite = admin_helpers::create_invite(&pool, &staff.caller(), request.expires_in_days)?;
    Ok(created_json(invite))
}

async fn revoke_invite(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    code: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    admin_helpers::revoke_invite(&pool, &staff.caller(), &code)?;
    Ok(ok_empty())
}
