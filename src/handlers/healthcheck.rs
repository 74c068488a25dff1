use actix_web::{get, HttpResponse};
use serde::Serialize;

use crate::response::ApiResponse;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[get("")]
pub async fn healthcheck() -> HttpResponse {
    ApiResponse::ok(Health { status: "OK" }, "Health check passed").into_response()
}
