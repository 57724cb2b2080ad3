use crate::error::AppError;
use crate::models::db_operations::users_db_operations;
use crate::models::{Caller, User};
use crate::DbPool;
use actix_session::{Session, SessionExt};
use actix_web::{dev, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

/// Session key holding the signed-in user's id.
pub const SESSION_USER_KEY: &str = "user_id";

/// A signed-in staff member, re-read from the database on every request so
/// that role changes and suspensions apply immediately.
#[derive(Debug, Clone)]
pub struct AuthenticatedStaff {
    pub user: User,
}

impl AuthenticatedStaff {
    pub fn caller(&self) -> Caller {
        Caller::from(&self.user)
    }
}

fn resolve(req: &HttpRequest, session: &Session) -> Result<AuthenticatedStaff, AppError> {
    let user_id = match session.get::<String>(SESSION_USER_KEY) {
        Ok(Some(id)) => id,
        Ok(None) => return Err(AppError::Unauthorized),
        Err(e) => {
            log::warn!("Unreadable session state, discarding it: {}", e);
            session.purge();
            return Err(AppError::Unauthorized);
        }
    };

    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| AppError::Internal("database pool is not registered".to_string()))?;
    let conn = pool.get()?;

    match users_db_operations::read_user(&conn, &user_id)? {
        None => {
            session.purge();
            Err(AppError::Unauthorized)
        }
        Some(user) if user.suspended => {
            log::warn!("Suspended user {} presented a live session; signing out.", user.id);
            session.purge();
            Err(AppError::Suspended)
        }
        Some(user) => Ok(AuthenticatedStaff { user }),
    }
}

impl FromRequest for AuthenticatedStaff {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        ready(resolve(req, &session))
    }
}
