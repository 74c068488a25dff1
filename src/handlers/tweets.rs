use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::{owned, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{non_blank, ContentRequest, Tweet};
use crate::pipeline;
use crate::response::{ApiResponse, Empty};
use crate::store::Store;

fn content(body: &ContentRequest) -> Result<String> {
    non_blank(Some(body.content.as_str()))
        .ok_or_else(|| ApiError::validation("Tweet content is required"))
}

#[post("")]
pub async fn create_tweet(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    body: web::Json<ContentRequest>,
) -> Result<HttpResponse> {
    let now = Utc::now();
    let tweet = Tweet {
        id: Uuid::new_v4(),
        owner: caller.id,
        content: content(&body)?,
        created_at: now,
        updated_at: now,
    };
    store.insert_tweet(&tweet).await?;
    info!("Tweet created successfully: {}", tweet.id);
    Ok(ApiResponse::created(tweet, "Tweet created successfully").into_response())
}

#[get("/{user_id}")]
pub async fn user_tweets(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    user_id: web::Path<String>,
) -> Result<HttpResponse> {
    let user = parse_id(&user_id, "user")?;
    let tweets = pipeline::user_tweets(store.get_ref(), user, caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully").into_response())
}

#[patch("/{tweet_id}")]
pub async fn update_tweet(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    tweet_id: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> Result<HttpResponse> {
    let id = parse_id(&tweet_id, "tweet")?;
    let content = content(&body)?;
    let tweet = owned(store.update_tweet(id, caller.id, &content).await?, "Tweet")?;
    info!("User {} updated tweet {}", caller.id, id);
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully").into_response())
}

#[delete("/{tweet_id}")]
pub async fn delete_tweet(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    tweet_id: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&tweet_id, "tweet")?;
    owned(store.delete_tweet(id, caller.id).await?, "Tweet")?;
    info!("User {} deleted tweet {}", caller.id, id);
    Ok(ApiResponse::ok(Empty {}, "Tweet deleted successfully").into_response())
}
