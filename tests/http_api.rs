mod common;

use std::sync::Arc;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::*;
use scribe_backend::config::{Config, WebConfig};
use scribe_backend::helper::admin_helpers;
use scribe_backend::helper::notification_helpers::{DbNotificationSink, NotificationSink};
use scribe_backend::models::Role;
use scribe_backend::routes;
use serde_json::{json, Value};

fn test_config() -> Config {
    Config {
        web: WebConfig { host: "127.0.0.1".to_string(), port: 0 },
        database_path: "/tmp".to_string(),
        allowed_origins: String::new(),
        log_level: "warn".to_string(),
        session_secret_key: String::new(),
        use_secure_cookies: false,
        bcrypt_cost: TEST_BCRYPT_COST,
    }
}

macro_rules! test_app {
    ($env:expr) => {{
        let sink: Arc<dyn NotificationSink> = Arc::new(DbNotificationSink::new($env.pool.clone()));
        test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(web::Data::new($env.pool.clone()))
                .app_data($env.views.clone())
                .app_data(web::Data::<dyn NotificationSink>::from(sink))
                .configure(routes::public::config_api)
                .service(
                    web::scope("/management/api")
                        .wrap(
                            SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                                .cookie_secure(false)
                                .build(),
                        )
                        .configure(routes::admin::config_api)
                        .configure(routes::staff::config_api),
                ),
        )
        .await
    }};
}

macro_rules! login {
    ($app:expr, $email:expr) => {{
        let req = test::TestRequest::post()
            .uri("/management/api/login")
            .set_json(json!({ "email": $email, "password": PASSWORD }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie: Cookie<'static> = resp
            .response()
            .cookies()
            .find(|c| c.name() == "id")
            .expect("session cookie")
            .into_owned();
        cookie
    }};
}

#[actix_web::test]
async fn first_signup_becomes_master_and_can_log_in() {
    let env = test_env();
    let app = test_app!(env);

    let req = test::TestRequest::post()
        .uri("/api/signup")
        .set_json(json!({
            "email": "founder@example.com",
            "display_name": "Founder",
            "password": PASSWORD,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["is_master"], true);
    assert!(body["data"].get("password_hash").is_none());

    let cookie = login!(app, "founder@example.com");
    let req = test::TestRequest::get().uri("/management/api/me").cookie(cookie).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["email"], "founder@example.com");
}

#[actix_web::test]
async fn protected_routes_need_a_session() {
    let env = test_env();
    let app = test_app!(env);

    for uri in ["/management/api/me", "/management/api/posts/mine", "/management/api/admin/users"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[actix_web::test]
async fn wrong_password_is_unauthorized() {
    let env = test_env();
    seed_user(&env.pool, "ed", Role::Editor, false);
    let app = test_app!(env);

    let req = test::TestRequest::post()
        .uri("/management/api/login")
        .set_json(json!({ "email": "ed@example.com", "password": "not-the-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn editor_workflow_over_http() {
    let env = test_env();
    let admin = seed_user(&env.pool, "admin", Role::Admin, true);
    seed_user(&env.pool, "ed", Role::Editor, false);
    let tag = seed_tag(&env.pool, &admin, "news");
    let app = test_app!(env);
    let editor_cookie = login!(app, "ed@example.com");

    let req = test::TestRequest::post()
        .uri("/management/api/posts")
        .cookie(editor_cookie.clone())
        .set_json(json!({ "title": "Over HTTP", "content": "Body" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let post_id = body["data"]["id"].as_str().expect("post id").to_string();
    assert_eq!(body["data"]["status"], "draft");

    let req = test::TestRequest::post()
        .uri(&format!("/management/api/posts/{}/submit", post_id))
        .cookie(editor_cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["fields"]["tags"].is_string());

    let req = test::TestRequest::patch()
        .uri(&format!("/management/api/posts/{}", post_id))
        .cookie(editor_cookie.clone())
        .set_json(json!({ "tag_ids": [tag.id] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/management/api/posts/{}/submit", post_id))
        .cookie(editor_cookie.clone())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "submitted");

    let req = test::TestRequest::post()
        .uri(&format!("/management/api/admin/posts/{}/publish", post_id))
        .cookie(editor_cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "admin_only");

    let admin_cookie = login!(app, "admin@example.com");
    let req = test::TestRequest::get()
        .uri("/management/api/notifications?unread_only=true")
        .cookie(admin_cookie.clone())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["type"], "submission");

    let req = test::TestRequest::post()
        .uri(&format!("/management/api/admin/posts/{}/publish", post_id))
        .cookie(admin_cookie)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "published");

    let req = test::TestRequest::get().uri("/api/posts/over-http").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["title"], "Over HTTP");
    assert!(body["data"].get("author_id").is_none());

    let req = test::TestRequest::post().uri(&format!("/api/posts/{}/view", post_id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn suspension_ends_the_live_session() {
    let env = test_env();
    let master = seed_user(&env.pool, "master", Role::Admin, true);
    let admin = seed_user(&env.pool, "admin", Role::Admin, false);
    let app = test_app!(env);
    let cookie = login!(app, "admin@example.com");

    let req = test::TestRequest::get().uri("/management/api/me").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    admin_helpers::set_suspended(&env.pool, &caller(&master), &admin.id, true).unwrap();

    let req = test::TestRequest::get().uri("/management/api/admin/users").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let cleared = resp.response().cookies().find(|c| c.name() == "id").expect("session removal cookie");
    assert_eq!(cleared.value(), "");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "suspended");
}

#[actix_web::test]
async fn master_cannot_be_suspended_over_http() {
    let env = test_env();
    let master = seed_user(&env.pool, "master", Role::Admin, true);
    seed_user(&env.pool, "admin", Role::Admin, false);
    let app = test_app!(env);
    let cookie = login!(app, "admin@example.com");

    let req = test::TestRequest::put()
        .uri(&format!("/management/api/admin/users/{}/suspension", master.id))
        .cookie(cookie)
        .set_json(json!({ "suspended": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "master_protected");
}

#[actix_web::test]
async fn slug_conflicts_map_to_409() {
    let env = test_env();
    seed_user(&env.pool, "ed", Role::Editor, false);
    let app = test_app!(env);
    let cookie = login!(app, "ed@example.com");

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let req = test::TestRequest::post()
            .uri("/management/api/posts")
            .cookie(cookie.clone())
            .set_json(json!({ "title": "Duplicate", "content": "x" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), expected);
    }
}

#[actix_web::test]
async fn public_reads_hide_unpublished_posts() {
    let env = test_env();
    let editor = seed_user(&env.pool, "ed", Role::Editor, false);
    let post = draft(&env.pool, &editor, "Secret", vec![]);
    let app = test_app!(env);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts/secret").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let req = test::TestRequest::post().uri(&format!("/api/posts/{}/view", post.id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let body: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[actix_web::test]
async fn deleting_a_draft_returns_no_content() {
    let env = test_env();
    let editor = seed_user(&env.pool, "ed", Role::Editor, false);
    let post = draft(&env.pool, &editor, "Short lived", vec![]);
    let app = test_app!(env);
    let cookie = login!(app, "ed@example.com");

    let uri = format!("/management/api/posts/{}", post.id);
    let req = test::TestRequest::delete().uri(&uri).cookie(cookie.clone()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(test::read_body(resp).await.is_empty());

    let req = test::TestRequest::delete().uri(&uri).cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
