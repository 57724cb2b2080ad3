use crate::models::db_operations::DbError;
use crate::policy::DenyReason;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> human readable problem.
pub type FieldErrors = BTreeMap<String, String>;

/// Every failure a workflow operation can surface to its caller.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(DenyReason),
    #[error("account suspended")]
    Suspended,
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not logged in")]
    Unauthorized,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), message.into());
        AppError::Validation(fields)
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::UniqueViolation(detail) => AppError::Conflict(detail),
            DbError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Internal(format!("R2D2 Pool error: {}", e))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) | AppError::Suspended => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Validation(fields) => json!({
                "success": false,
                "error": "Validation failed.",
                "fields": fields,
            }),
            AppError::Forbidden(reason) => json!({
                "success": false,
                "error": reason.to_string(),
                "reason": reason,
            }),
            AppError::Suspended => json!({
                "success": false,
                "error": "Your account is suspended.",
                "reason": "suspended",
            }),
            AppError::Internal(detail) => {
                log::error!("Internal error while handling request: {}", detail);
                json!({ "success": false, "error": "An internal error occurred." })
            }
            other => json!({ "success": false, "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
