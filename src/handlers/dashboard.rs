use actix_web::{get, web, HttpResponse};

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::pipeline;
use crate::response::ApiResponse;
use crate::store::Store;

#[get("/stats")]
pub async fn channel_stats(
    store: web::Data<dyn Store>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    let stats = pipeline::channel_stats(store.get_ref(), caller.id).await?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully").into_response())
}

#[get("/videos")]
pub async fn channel_videos(
    store: web::Data<dyn Store>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    let owner = store
        .find_user(caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    let videos = pipeline::dashboard_videos(store.get_ref(), &owner).await?;
    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully").into_response())
}
