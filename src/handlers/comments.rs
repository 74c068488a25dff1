use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::{owned, parse_id, PageQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{non_blank, Comment, ContentRequest};
use crate::pipeline;
use crate::response::{ApiResponse, Empty};
use crate::store::Store;

fn content(body: &ContentRequest) -> Result<String> {
    non_blank(Some(body.content.as_str()))
        .ok_or_else(|| ApiError::validation("Comment content is required"))
}

async fn visible_video(store: &dyn Store, id: Uuid, viewer: Uuid) -> Result<()> {
    if pipeline::video_visible(store, id, viewer).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Video not found"))
    }
}

#[get("/{video_id}")]
pub async fn list_comments(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    video_id: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let video = parse_id(&video_id, "video")?;
    visible_video(store.get_ref(), video, caller.id).await?;
    let page = pipeline::video_comments(store.get_ref(), video, query.request()).await?;
    Ok(ApiResponse::ok(page, "Comments fetched successfully").into_response())
}

#[post("/{video_id}")]
pub async fn add_comment(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    video_id: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> Result<HttpResponse> {
    let video = parse_id(&video_id, "video")?;
    let content = content(&body)?;
    visible_video(store.get_ref(), video, caller.id).await?;

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4(),
        video,
        owner: caller.id,
        content,
        created_at: now,
        updated_at: now,
    };
    store.insert_comment(&comment).await?;
    info!("User {} commented on video {}", caller.id, video);
    Ok(ApiResponse::created(comment, "Comment added successfully").into_response())
}

#[patch("/{comment_id}")]
pub async fn update_comment(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    comment_id: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&comment_id, "comment")?;
    let content = content(&body)?;
    let comment = owned(store.update_comment(id, caller.id, &content).await?, "Comment")?;
    info!("User {} updated comment {}", caller.id, id);
    Ok(ApiResponse::ok(comment, "Comment updated successfully").into_response())
}

#[delete("/{comment_id}")]
pub async fn delete_comment(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    comment_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&comment_id, "comment")?;
    owned(store.delete_comment(id, caller.id).await?, "Comment")?;
    info!("User {} deleted comment {}", caller.id, id);
    Ok(ApiResponse::ok(Empty {}, "Comment deleted successfully").into_response())
}
