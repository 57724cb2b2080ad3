#![allow(dead_code)]

use std::sync::Mutex;

use actix_web::web;
use chrono::Utc;
use redb::Database;
use scribe_backend::helper::admin_helpers;
use scribe_backend::helper::notification_helpers::NotificationSink;
use scribe_backend::helper::post_helpers;
use scribe_backend::models::db_operations::{users_db_operations, DbError};
use scribe_backend::models::{Caller, NewNotification, NewPost, NotificationType, Post, Role, Tag, User};
use scribe_backend::setup::db_setup;
use scribe_backend::{build_pool, DbPool};
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse";
/// Lowest cost bcrypt accepts; keeps the suite fast.
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestEnv {
    _dir: tempfile::TempDir,
    pub pool: DbPool,
    pub views: web::Data<Database>,
}

pub fn test_env() -> TestEnv {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let pool = build_pool(&dir.path().join("scribe.db")).expect("build pool");
    {
        let mut conn = pool.get().expect("get connection");
        db_setup::setup_sqlite_db(&mut conn).expect("create schema");
    }
    let views = Database::create(dir.path().join("views.redb")).expect("create views db");
    db_setup::setup_views_db(&views).expect("create views table");
    TestEnv { _dir: dir, pool, views: web::Data::new(views) }
}

pub fn seed_user(pool: &DbPool, name: &str, role: Role, is_master: bool) -> User {
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: format!("{}@example.com", name),
        display_name: name.to_string(),
        role,
        suspended: false,
        is_master,
        created_at: Utc::now(),
    };
    let hash = bcrypt::hash(PASSWORD, TEST_BCRYPT_COST).expect("hash password");
    let conn = pool.get().expect("get connection");
    users_db_operations::create_user(&conn, &user, &hash).expect("insert user");
    user
}

pub fn seed_tag(pool: &DbPool, admin: &User, name: &str) -> Tag {
    admin_helpers::create_tag(pool, &caller(admin), name, None).expect("create tag")
}

pub fn caller(user: &User) -> Caller {
    Caller::from(user)
}

pub fn new_post(title: &str, content: &str, tag_ids: Vec<String>) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: content.to_string(),
        tag_ids,
        ..NewPost::default()
    }
}

pub fn draft(pool: &DbPool, author: &User, title: &str, tag_ids: Vec<String>) -> Post {
    post_helpers::create_post(pool, &NullSink, &caller(author), new_post(title, "Body text", tag_ids))
        .expect("create draft")
}

/// Keeps every batch it is handed so tests can inspect the fan-out.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<NewNotification>>,
}

impl RecordingSink {
    pub fn all(&self) -> Vec<NewNotification> {
        self.delivered.lock().expect("sink lock").clone()
    }

    pub fn of_kind(&self, kind: NotificationType) -> Vec<NewNotification> {
        self.all().into_iter().filter(|n| n.kind == kind).collect()
    }

    pub fn recipients(&self, kind: NotificationType) -> Vec<String> {
        let mut ids: Vec<String> = self.of_kind(kind).into_iter().map(|n| n.user_id).collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.delivered.lock().expect("sink lock").clear();
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, batch: &[NewNotification]) -> Result<(), DbError> {
        self.delivered.lock().expect("sink lock").extend_from_slice(batch);
        Ok(())
    }
}

pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _batch: &[NewNotification]) -> Result<(), DbError> {
        Ok(())
    }
}

/// Always fails, standing in for a broken notification store.
pub struct FailingSink;

impl NotificationSink for FailingSink {
    fn deliver(&self, _batch: &[NewNotification]) -> Result<(), DbError> {
        Err(DbError::NotFound("notification store unavailable".to_string()))
    }
}

pub fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}
