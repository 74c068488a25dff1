use actix_web::{get, post, web, HttpResponse};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use super::parse_id;
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{LikeKind, LikeTarget, UnknownLikeKind};
use crate::pipeline;
use crate::response::ApiResponse;
use crate::store::Store;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i64,
}

/// Videos, and comments on them, are only likeable while the caller can
/// see the video.
async fn target_visible(store: &dyn Store, target: LikeTarget, viewer: Uuid) -> Result<bool> {
    Ok(match target.kind {
        LikeKind::Video => pipeline::video_visible(store, target.id, viewer).await?,
        LikeKind::Comment => match store.find_comment(target.id).await? {
            Some(comment) => pipeline::video_visible(store, comment.video, viewer).await?,
            None => false,
        },
        LikeKind::Tweet => store.find_tweet(target.id).await?.is_some(),
    })
}

#[post("/toggle/{kind}/{target_id}")]
pub async fn toggle_like(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (kind, target_id) = path.into_inner();
    let kind: LikeKind = kind
        .parse()
        .map_err(|e: UnknownLikeKind| ApiError::validation(e.to_string()))?;
    let target = LikeTarget {
        kind,
        id: parse_id(&target_id, kind.as_str())?,
    };
    if !target_visible(store.get_ref(), target, caller.id).await? {
        let what = match kind {
            LikeKind::Video => "Video",
            LikeKind::Comment => "Comment",
            LikeKind::Tweet => "Tweet",
        };
        return Err(ApiError::not_found(format!("{} not found", what)));
    }

    let outcome = store.toggle_like(target, caller.id).await?;
    let likes_count = store.count_likes(target).await?;
    info!("User {} {:?} like on {} {}", caller.id, outcome, kind, target.id);

    let message = if outcome.is_added() {
        "Liked successfully"
    } else {
        "Unliked successfully"
    };
    Ok(ApiResponse::ok(
        LikeState {
            liked: outcome.is_added(),
            likes_count,
        },
        message,
    )
    .into_response())
}

#[get("/videos")]
pub async fn liked_videos(
    store: web::Data<dyn Store>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    let videos = pipeline::liked_videos(store.get_ref(), caller.id).await?;
    Ok(ApiResponse::ok(videos, "Liked videos fetched successfully").into_response())
}
