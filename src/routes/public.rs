use crate::config::Config;
use crate::error::AppError;
use crate::helper::admin_helpers;
use crate::helper::public_helpers::{self, Registration};
use crate::routes::{created_json, ok_empty, ok_json, PageQuery};
use crate::DbPool;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct PublishedQuery {
    tag: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    email: String,
    display_name: String,
    password: String,
    invite_code: Option<String>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/posts", web::get().to(list_posts))
            .route("/posts/{slug}", web::get().to(get_post_by_slug))
            .route("/posts/{id}/view", web::post().to(record_view))
            .route("/tags", web::get().to(list_tags))
            .route("/signup", web::post().to(signup)),
    );
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn list_posts(pool: web::Data<DbPool>, query: web::Query<PublishedQuery>) -> Result<HttpResponse, AppError> {
    let page = PageQuery { limit: query.limit, offset: query.offset };
    let posts = public_helpers::list_published(&pool, query.tag.as_deref(), page.limit(), page.offset())?;
    Ok(ok_json(posts))
}

async fn get_post_by_slug(pool: web::Data<DbPool>, slug: web::Path<String>) -> Result<HttpResponse, AppError> {
    Ok(ok_json(public_helpers::get_published_by_slug(&pool, &slug)?))
}

async fn record_view(
    pool: web::Data<DbPool>,
    views_db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    public_helpers::record_view(&pool, &views_db, &id)?;
    Ok(ok_empty())
}

async fn list_tags(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    Ok(ok_json(admin_helpers::list_tags(&pool)?))
}

async fn signup(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, AppError> {
    let registration = Registration {
        email: &body.email,
        display_name: &body.display_name,
        password: &body.password,
        invite_code: body.invite_code.as_deref(),
    };
    let user = public_helpers::register_user(&pool, registration, config.bcrypt_cost)?;
    Ok(created_json(user))
}
