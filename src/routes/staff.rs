use crate::error::AppError;
use crate::helper::notification_helpers::{self, NotificationSink};
use crate::helper::{post_helpers, public_helpers};
use crate::middleware::{AuthenticatedStaff, SESSION_USER_KEY};
use crate::models::{NewPost, PostPatch};
use crate::routes::{created_json, ok_empty, ok_json, PageQuery};
use crate::DbPool;
use actix_session::Session;
use actix_web::{web, HttpResponse};
use redb::Database;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct NoteRequest {
    note: String,
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    ids: Vec<String>,
}

/// Routes for any signed-in staff member, mounted under `/management/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/me", web::get().to(me))
        .route("/posts", web::post().to(create_post))
        .route("/posts/mine", web::get().to(my_posts))
        .route("/posts/{id}", web::get().to(get_post))
        .route("/posts/{id}", web::patch().to(edit_post))
        .route("/posts/{id}", web::delete().to(delete_post))
        .route("/posts/{id}/submit", web::post().to(submit_post))
        .route("/posts/{id}/notes", web::get().to(list_notes))
        .route("/posts/{id}/notes", web::post().to(add_note))
        .route("/notifications", web::get().to(list_notifications))
        .route("/notifications/read", web::post().to(mark_notifications_read));
}

async fn login(
    session: Session,
    pool: web::Data<DbPool>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let user = public_helpers::verify_credentials(&pool, &body.email, &body.password)?;
    session.renew();
    session
        .insert(SESSION_USER_KEY, user.id.clone())
        .map_err(|e| AppError::Internal(format!("failed to write session: {}", e)))?;
    log::info!("User {} signed in", user.id);
    Ok(ok_json(user))
}

async fn logout(session: Session) -> HttpResponse {
    session.purge();
    ok_empty()
}

async fn me(staff: AuthenticatedStaff) -> HttpResponse {
    ok_json(staff.user)
}

async fn create_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    body: web::Json<NewPost>,
) -> Result<HttpResponse, AppError> {
    let post = post_helpers::create_post(&pool, sink.get_ref(), &staff.caller(), body.into_inner())?;
    Ok(created_json(post))
}

async fn my_posts(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let posts = post_helpers::list_my_posts(&pool, &staff.caller(), page.limit(), page.offset())?;
    Ok(ok_json(posts))
}

async fn get_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::get_post(&pool, &staff.caller(), &id)?))
}

async fn edit_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    id: web::Path<String>,
    body: web::Json<PostPatch>,
) -> Result<HttpResponse, AppError> {
    let post = post_helpers::edit_post(&pool, sink.get_ref(), &staff.caller(), &id, body.into_inner())?;
    Ok(ok_json(post))
}

async fn delete_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    views_db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    post_helpers::delete_post(&pool, &staff.caller(), &id)?;
    public_helpers::forget_views(&views_db, &id);
    Ok(HttpResponse::NoContent().finish())
}

async fn submit_post(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::submit_post(&pool, sink.get_ref(), &staff.caller(), &id)?))
}

async fn list_notes(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(ok_json(post_helpers::list_notes(&pool, &staff.caller(), &id)?))
}

async fn add_note(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    sink: web::Data<dyn NotificationSink>,
    id: web::Path<String>,
    body: web::Json<NoteRequest>,
) -> Result<HttpResponse, AppError> {
    let note = post_helpers::add_note(&pool, sink.get_ref(), &staff.caller(), &id, &body.note)?;
    Ok(created_json(note))
}

async fn list_notifications(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, AppError> {
    let page = PageQuery { limit: query.limit, offset: query.offset };
    let items = notification_helpers::list_notifications(
        &pool,
        &staff.caller(),
        query.unread_only,
        page.limit(),
        page.offset(),
    )?;
    Ok(ok_json(items))
}

async fn mark_notifications_read(
    staff: AuthenticatedStaff,
    pool: web::Data<DbPool>,
    body: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, AppError> {
    let marked = notification_helpers::mark_read(&pool, &staff.caller(), &body.ids)?;
    Ok(ok_json(json!({ "marked": marked })))
}
