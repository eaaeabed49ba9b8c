use actix_web::{Error, HttpResponse};
use paperclip::actix::api_v2_operation;

use crate::api::HealthResponse;

pub mod auth;
pub mod books;
pub mod borrows;

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(HealthResponse { ok: true }))
}
