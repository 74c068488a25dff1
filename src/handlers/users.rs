use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{get, patch, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use super::StagedFile;
use crate::auth::{AuthUser, Identity, TokenKind, TokenPair, REFRESH_COOKIE};
use crate::error::{ApiError, Result};
use crate::media::{discard, MediaStore, UploadedMedia};
use crate::models::{
    non_blank, normalize_handle, ChangePasswordRequest, ImageSlot, LoginRequest, RefreshRequest,
    UpdateAccountRequest, User,
};
use crate::pipeline;
use crate::response::{ApiResponse, Empty};
use crate::store::{AccountUpdate, Store};

#[derive(Debug, MultipartForm)]
pub struct RegisterForm {
    pub fullname: Option<Text<String>>,
    pub email: Option<Text<String>>,
    pub username: Option<Text<String>>,
    pub password: Option<Text<String>>,
    pub avatar: Option<TempFile>,
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

#[derive(Debug, MultipartForm)]
pub struct AvatarForm {
    pub avatar: Option<TempFile>,
}

#[derive(Debug, MultipartForm)]
pub struct CoverImageForm {
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn text(field: &Option<Text<String>>) -> Option<String> {
    non_blank(field.as_ref().map(|t| t.as_str()))
}

async fn current_user(store: &dyn Store, id: Uuid) -> Result<User> {
    store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))
}

fn with_cookies(
    mut response: HttpResponse,
    cookies: impl IntoIterator<Item = actix_web::cookie::Cookie<'static>>,
) -> Result<HttpResponse> {
    for cookie in cookies {
        response
            .add_cookie(&cookie)
            .map_err(|e| ApiError::Internal(format!("failed to set cookie: {}", e)))?;
    }
    Ok(response)
}

#[post("/register")]
pub async fn register(
    store: web::Data<dyn Store>,
    media: web::Data<dyn MediaStore>,
    identity: web::Data<Identity>,
    MultipartForm(form): MultipartForm<RegisterForm>,
) -> Result<HttpResponse> {
    let (Some(fullname), Some(email), Some(username), Some(password)) = (
        text(&form.fullname),
        text(&form.email),
        text(&form.username),
        text(&form.password),
    ) else {
        return Err(ApiError::validation("All fields are required"));
    };
    let email = normalize_handle(&email);
    let username = normalize_handle(&username);
    if !email.contains('@') {
        return Err(ApiError::validation("Email is invalid"));
    }

    if store.find_user_by_username(&username).await?.is_some()
        || store.find_user_by_email(&email).await?.is_some()
    {
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar_file = StagedFile::required(form.avatar, "Avatar")?;
    let password_hash = identity.hash_password(&password).await?;
    let cover_file = form
        .cover_image
        .map(|f| StagedFile::from_upload(f, "Cover image"))
        .transpose()?;

    let avatar = media.upload(avatar_file.path()).await?;
    let cover = match &cover_file {
        Some(file) => match media.upload(file.path()).await {
            Ok(uploaded) => Some(uploaded),
            Err(e) => {
                discard(media.get_ref(), &avatar).await;
                return Err(e.into());
            }
        },
        None => None,
    };
    let uploads: Vec<&UploadedMedia> = std::iter::once(&avatar).chain(cover.as_ref()).collect();

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        fullname,
        avatar: avatar.url.clone(),
        cover_image: cover.as_ref().map(|c| c.url.clone()),
        watch_history: Vec::new(),
        password_hash,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };

    let created = match store.create_user(&user).await {
        Ok(created) => created,
        Err(e) => {
            for uploaded in &uploads {
                discard(media.get_ref(), uploaded).await;
            }
            return Err(e.into());
        }
    };
    if !created {
        for uploaded in &uploads {
            discard(media.get_ref(), uploaded).await;
        }
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    info!("Registered user {} ({})", user.username, user.id);
    Ok(ApiResponse::created(user, "User registered successfully").into_response())
}

#[post("/login")]
pub async fn login(
    store: web::Data<dyn Store>,
    identity: web::Data<Identity>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let user = if let Some(username) = non_blank(body.username.as_deref()) {
        store.find_user_by_username(&normalize_handle(&username)).await?
    } else if let Some(email) = non_blank(body.email.as_deref()) {
        store.find_user_by_email(&normalize_handle(&email)).await?
    } else {
        return Err(ApiError::validation("Username or email is required"));
    };
    let user = user.ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !identity
        .verify_password(&body.password, &user.password_hash)
        .await?
    {
        warn!("Failed login for {}", user.username);
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let tokens = identity.issue(&user)?;
    if !store
        .set_refresh_token(user.id, Some(&tokens.refresh_token))
        .await?
    {
        return Err(ApiError::not_found("User does not exist"));
    }

    info!("User {} logged in", user.username);
    let cookies = identity.session_cookies(&tokens);
    let response = ApiResponse::ok(SessionPayload { user, tokens }, "User logged in successfully")
        .into_response();
    with_cookies(response, cookies)
}

#[post("/logout")]
pub async fn logout(
    store: web::Data<dyn Store>,
    identity: web::Data<Identity>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    store.set_refresh_token(caller.id, None).await?;
    info!("User {} logged out", caller.username);
    let response = ApiResponse::ok(Empty {}, "User logged out").into_response();
    with_cookies(response, identity.cleared_cookies())
}

#[post("/refresh-token")]
pub async fn refresh_token(
    req: HttpRequest,
    store: web::Data<dyn Store>,
    identity: web::Data<Identity>,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<HttpResponse> {
    let presented = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = identity.verify(&presented, TokenKind::Refresh)?;
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;
    let user = store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;
    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = identity.issue(&user)?;
    if !store
        .rotate_refresh_token(user.id, &presented, &tokens.refresh_token)
        .await?
    {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    debug!("Rotated refresh token for {}", user.id);
    let cookies = identity.session_cookies(&tokens);
    let response = ApiResponse::ok(tokens, "Access token refreshed").into_response();
    with_cookies(response, cookies)
}

#[get("/current-user")]
pub async fn get_current_user(
    store: web::Data<dyn Store>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    let user = current_user(store.get_ref(), caller.id).await?;
    Ok(ApiResponse::ok(user, "Current user fetched successfully").into_response())
}

#[post("/change-password")]
pub async fn change_password(
    store: web::Data<dyn Store>,
    identity: web::Data<Identity>,
    caller: AuthUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse> {
    let new_password = non_blank(Some(body.new_password.as_str()))
        .ok_or_else(|| ApiError::validation("New password is required"))?;
    let user = current_user(store.get_ref(), caller.id).await?;
    if !identity
        .verify_password(&body.old_password, &user.password_hash)
        .await?
    {
        return Err(ApiError::validation("Invalid old password"));
    }

    let hash = identity.hash_password(&new_password).await?;
    if !store.set_password_hash(user.id, &hash).await? {
        return Err(ApiError::not_found("User does not exist"));
    }
    info!("User {} changed their password", user.username);
    Ok(ApiResponse::ok(Empty {}, "Password changed successfully").into_response())
}

#[patch("/update-account")]
pub async fn update_account(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    body: web::Json<UpdateAccountRequest>,
) -> Result<HttpResponse> {
    let (Some(fullname), Some(email)) = (
        non_blank(Some(body.fullname.as_str())),
        non_blank(Some(body.email.as_str())).map(|e| normalize_handle(&e)),
    ) else {
        return Err(ApiError::validation("All fields are required"));
    };
    if !email.contains('@') {
        return Err(ApiError::validation("Email is invalid"));
    }

    match store.update_account(caller.id, &fullname, &email).await? {
        AccountUpdate::Updated(user) => {
            info!("Updated account details for {}", user.id);
            Ok(ApiResponse::ok(user, "Account details updated successfully").into_response())
        }
        AccountUpdate::EmailTaken => Err(ApiError::Conflict("Email is already in use".into())),
        AccountUpdate::NotFound => Err(ApiError::not_found("User does not exist")),
    }
}

async fn replace_image(
    store: &dyn Store,
    media: &dyn MediaStore,
    caller: &AuthUser,
    slot: ImageSlot,
    file: StagedFile,
) -> Result<User> {
    let uploaded = media.upload(file.path()).await?;
    match store.set_user_image(caller.id, slot, &uploaded.url).await {
        Ok(Some(user)) => {
            info!("Updated {:?} for {}", slot, caller.id);
            Ok(user)
        }
        Ok(None) => {
            discard(media, &uploaded).await;
            Err(ApiError::not_found("User does not exist"))
        }
        Err(e) => {
            discard(media, &uploaded).await;
            Err(e.into())
        }
    }
}

#[patch("/avatar")]
pub async fn update_avatar(
    store: web::Data<dyn Store>,
    media: web::Data<dyn MediaStore>,
    caller: AuthUser,
    MultipartForm(form): MultipartForm<AvatarForm>,
) -> Result<HttpResponse> {
    let file = StagedFile::required(form.avatar, "Avatar")?;
    let user = replace_image(
        store.get_ref(),
        media.get_ref(),
        &caller,
        ImageSlot::Avatar,
        file,
    )
    .await?;
    Ok(ApiResponse::ok(user, "Avatar updated successfully").into_response())
}

#[patch("/cover-image")]
pub async fn update_cover_image(
    store: web::Data<dyn Store>,
    media: web::Data<dyn MediaStore>,
    caller: AuthUser,
    MultipartForm(form): MultipartForm<CoverImageForm>,
) -> Result<HttpResponse> {
    let file = StagedFile::required(form.cover_image, "Cover image")?;
    let user = replace_image(
        store.get_ref(),
        media.get_ref(),
        &caller,
        ImageSlot::CoverImage,
        file,
    )
    .await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully").into_response())
}

#[get("/channel/{username}")]
pub async fn channel_profile(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let username = normalize_handle(&username);
    if username.is_empty() {
        return Err(ApiError::validation("Username is missing"));
    }
    let profile = pipeline::channel_profile(store.get_ref(), &username, caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully").into_response())
}

#[get("/watch-history")]
pub async fn watch_history(
    store: web::Data<dyn Store>,
    caller: AuthUser,
) -> Result<HttpResponse> {
    let user = current_user(store.get_ref(), caller.id).await?;
    let history = pipeline::watch_history(store.get_ref(), &user).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully").into_response())
}
