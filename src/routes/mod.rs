use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

pub mod admin;
pub mod public;
pub mod staff;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub fn ok_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse { success: true, data: Some(data), error: None })
}

pub fn created_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse { success: true, data: Some(data), error: None })
}

pub fn ok_empty() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::<()> { success: true, data: None, error: None })
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}
