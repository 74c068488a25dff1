use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{owned, parse_id, StagedFile};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::media::{discard, upload_pair, MediaStore};
use crate::models::{non_blank, Video, VideoChanges};
use crate::pipeline::{self, FeedParams, PageRequest, VideoSort};
use crate::response::{ApiResponse, Empty};
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, MultipartForm)]
pub struct PublishVideoForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    #[multipart(rename = "videoFile")]
    pub video_file: Option<TempFile>,
    pub thumbnail: Option<TempFile>,
}

#[derive(Debug, MultipartForm)]
pub struct UpdateVideoForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub thumbnail: Option<TempFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishState {
    pub is_published: bool,
}

fn text(field: &Option<Text<String>>) -> Option<String> {
    non_blank(field.as_ref().map(|t| t.as_str()))
}

#[get("")]
pub async fn list_videos(
    store: web::Data<dyn Store>,
    _caller: AuthUser,
    query: web::Query<VideoListQuery>,
) -> Result<HttpResponse> {
    let owner = match non_blank(query.user_id.as_deref()) {
        Some(raw) => Some(parse_id(&raw, "user")?),
        None => None,
    };
    let params = FeedParams {
        page: PageRequest::new(query.page, query.limit),
        search: non_blank(query.query.as_deref()),
        owner,
        sort: VideoSort::parse(query.sort_by.as_deref(), query.sort_type.as_deref()),
    };
    debug!("Video feed request: {:?}", params);

    let feed = pipeline::video_feed(store.get_ref(), &params).await?;
    Ok(ApiResponse::ok(feed, "Videos fetched successfully").into_response())
}

#[post("")]
pub async fn publish_video(
    store: web::Data<dyn Store>,
    media: web::Data<dyn MediaStore>,
    caller: AuthUser,
    MultipartForm(form): MultipartForm<PublishVideoForm>,
) -> Result<HttpResponse> {
    let (Some(title), Some(description)) = (text(&form.title), text(&form.description)) else {
        return Err(ApiError::validation("Title and description are required"));
    };
    let video_file = StagedFile::required(form.video_file, "Video")?;
    let thumbnail_file = StagedFile::required(form.thumbnail, "Thumbnail")?;

    let (video_media, thumbnail) =
        upload_pair(media.get_ref(), video_file.path(), thumbnail_file.path()).await?;

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4(),
        owner: caller.id,
        title,
        description,
        video_file: video_media.url.clone(),
        thumbnail: thumbnail.url.clone(),
        duration: video_media.duration.unwrap_or(0.0),
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = store.insert_video(&video).await {
        discard(media.get_ref(), &video_media).await;
        discard(media.get_ref(), &thumbnail).await;
        return Err(e.into());
    }

    info!("User {} published video {}", caller.id, video.id);
    Ok(ApiResponse::created(video, "Video published successfully").into_response())
}

#[get("/{video_id}")]
pub async fn get_video(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&video_id, "video")?;
    let mut video = pipeline::video_detail(store.get_ref(), id, caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    store.record_view(id).await?;
    store.push_watch_history(caller.id, id).await?;
    video.views += 1;

    Ok(ApiResponse::ok(video, "Video fetched successfully").into_response())
}

#[patch("/{video_id}")]
pub async fn update_video(
    store: web::Data<dyn Store>,
    media: web::Data<dyn MediaStore>,
    caller: AuthUser,
    video_id: web::Path<String>,
    MultipartForm(form): MultipartForm<UpdateVideoForm>,
) -> Result<HttpResponse> {
    let id = parse_id(&video_id, "video")?;
    let thumbnail_file = form
        .thumbnail
        .map(|f| StagedFile::from_upload(f, "Thumbnail"))
        .transpose()?;
    let mut changes = VideoChanges {
        title: text(&form.title),
        description: text(&form.description),
        thumbnail: None,
    };
    if changes.is_empty() && thumbnail_file.is_none() {
        return Err(ApiError::validation(
            "Provide a title, description or thumbnail to update",
        ));
    }

    let thumbnail = match &thumbnail_file {
        Some(file) => Some(media.upload(file.path()).await?),
        None => None,
    };
    changes.thumbnail = thumbnail.as_ref().map(|t| t.url.clone());

    let outcome = match store.update_video(id, caller.id, &changes).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(t) = &thumbnail {
                discard(media.get_ref(), t).await;
            }
            return Err(e.into());
        }
    };
    let video = match owned(outcome, "Video") {
        Ok(video) => video,
        Err(e) => {
            if let Some(t) = &thumbnail {
                discard(media.get_ref(), t).await;
            }
            return Err(e);
        }
    };

    info!("User {} updated video {}", caller.id, id);
    Ok(ApiResponse::ok(video, "Video updated successfully").into_response())
}

#[delete("/{video_id}")]
pub async fn delete_video(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&video_id, "video")?;
    owned(store.delete_video(id, caller.id).await?, "Video")?;
    info!("User {} deleted video {}", caller.id, id);
    Ok(ApiResponse::ok(Empty {}, "Video deleted successfully").into_response())
}

#[patch("/{video_id}/toggle-publish")]
pub async fn toggle_publish(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&video_id, "video")?;
    let is_published = owned(store.toggle_video_published(id, caller.id).await?, "Video")?;
    info!("Video {} published: {}", id, is_published);
    Ok(ApiResponse::ok(
        PublishState { is_published },
        "Publish status toggled successfully",
    )
    .into_response())
}
