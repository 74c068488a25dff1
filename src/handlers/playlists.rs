use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::{owned, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{
    non_blank, CreatePlaylistRequest, Playlist, PlaylistChanges, UpdatePlaylistRequest,
};
use crate::pipeline;
use crate::response::{ApiResponse, Empty};
use crate::store::Store;

#[post("")]
pub async fn create_playlist(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    body: web::Json<CreatePlaylistRequest>,
) -> Result<HttpResponse> {
    let (Some(name), Some(description)) = (
        non_blank(Some(body.name.as_str())),
        non_blank(Some(body.description.as_str())),
    ) else {
        return Err(ApiError::validation("Name and description are required"));
    };

    let now = Utc::now();
    let playlist = Playlist {
        id: Uuid::new_v4(),
        owner: caller.id,
        name,
        description,
        videos: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.insert_playlist(&playlist).await?;
    info!("User {} created playlist {}", caller.id, playlist.id);
    Ok(ApiResponse::created(playlist, "Playlist created successfully").into_response())
}

#[get("/user/{user_id}")]
pub async fn user_playlists(
    store: web::Data<dyn Store>,
    _caller: AuthUser,
    user_id: web::Path<String>,
) -> Result<HttpResponse> {
    let user = parse_id(&user_id, "user")?;
    if store.find_user(user).await?.is_none() {
        return Err(ApiError::not_found("User does not exist"));
    }
    let playlists = pipeline::user_playlists(store.get_ref(), user).await?;
    Ok(ApiResponse::ok(playlists, "User playlists fetched successfully").into_response())
}

#[get("/{playlist_id}")]
pub async fn get_playlist(
    store: web::Data<dyn Store>,
    _caller: AuthUser,
    playlist_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&playlist_id, "playlist")?;
    let playlist = pipeline::playlist_detail(store.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully").into_response())
}

#[patch("/{playlist_id}")]
pub async fn update_playlist(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    playlist_id: web::Path<String>,
    body: web::Json<UpdatePlaylistRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&playlist_id, "playlist")?;
    let changes = PlaylistChanges {
        name: non_blank(body.name.as_deref()),
        description: non_blank(body.description.as_deref()),
    };
    if changes.is_empty() {
        return Err(ApiError::validation("Provide a name or description to update"));
    }
    let playlist = owned(
        store.update_playlist(id, caller.id, &changes).await?,
        "Playlist",
    )?;
    info!("User {} updated playlist {}", caller.id, id);
    Ok(ApiResponse::ok(playlist, "Playlist updated successfully").into_response())
}

#[delete("/{playlist_id}")]
pub async fn delete_playlist(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    playlist_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&playlist_id, "playlist")?;
    owned(store.delete_playlist(id, caller.id).await?, "Playlist")?;
    info!("User {} deleted playlist {}", caller.id, id);
    Ok(ApiResponse::ok(Empty {}, "Playlist deleted successfully").into_response())
}

#[post("/{playlist_id}/videos/{video_id}")]
pub async fn add_video(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (playlist_id, video_id) = path.into_inner();
    let id = parse_id(&playlist_id, "playlist")?;
    let video = parse_id(&video_id, "video")?;
    if !pipeline::video_visible(store.get_ref(), video, caller.id).await? {
        return Err(ApiError::not_found("Video not found"));
    }

    let added = owned(
        store.add_playlist_video(id, caller.id, video).await?,
        "Playlist",
    )?;
    if !added {
        return Err(ApiError::validation("Video is already in the playlist"));
    }
    info!("Added video {} to playlist {}", video, id);
    let playlist = pipeline::playlist_detail(store.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(playlist, "Video added to playlist successfully").into_response())
}

#[delete("/{playlist_id}/videos/{video_id}")]
pub async fn remove_video(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (playlist_id, video_id) = path.into_inner();
    let id = parse_id(&playlist_id, "playlist")?;
    let video = parse_id(&video_id, "video")?;

    let removed = owned(
        store.remove_playlist_video(id, caller.id, video).await?,
        "Playlist",
    )?;
    if !removed {
        return Err(ApiError::validation("Video is not in the playlist"));
    }
    info!("Removed video {} from playlist {}", video, id);
    let playlist = pipeline::playlist_detail(store.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(playlist, "Video removed from playlist successfully").into_response())
}
