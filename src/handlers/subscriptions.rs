use actix_web::{get, post, web, HttpResponse};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use super::parse_id;
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::pipeline;
use crate::response::ApiResponse;
use crate::store::Store;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub subscribed: bool,
    pub subscribers_count: i64,
}

async fn existing_user(store: &dyn Store, id: Uuid, what: &str) -> Result<()> {
    match store.find_user(id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(format!("{} does not exist", what))),
    }
}

#[post("/c/{channel_id}")]
pub async fn toggle_subscription(
    store: web::Data<dyn Store>,
    caller: AuthUser,
    channel_id: web::Path<String>,
) -> Result<HttpResponse> {
    let channel = parse_id(&channel_id, "channel")?;
    if channel == caller.id {
        return Err(ApiError::validation("You cannot subscribe to your own channel"));
    }
    existing_user(store.get_ref(), channel, "Channel").await?;

    let outcome = store.toggle_subscription(caller.id, channel).await?;
    let subscribers_count = store.count_subscribers(channel).await?;
    info!("User {} {:?} subscription to {}", caller.id, outcome, channel);

    let message = if outcome.is_added() {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(
        SubscriptionState {
            subscribed: outcome.is_added(),
            subscribers_count,
        },
        message,
    )
    .into_response())
}

#[get("/c/{channel_id}")]
pub async fn channel_subscribers(
    store: web::Data<dyn Store>,
    _caller: AuthUser,
    channel_id: web::Path<String>,
) -> Result<HttpResponse> {
    let channel = parse_id(&channel_id, "channel")?;
    existing_user(store.get_ref(), channel, "Channel").await?;
    let subscribers = pipeline::channel_subscribers(store.get_ref(), channel).await?;
    Ok(ApiResponse::ok(subscribers, "Subscribers fetched successfully").into_response())
}

#[get("/u/{subscriber_id}")]
pub async fn subscribed_channels(
    store: web::Data<dyn Store>,
    _caller: AuthUser,
    subscriber_id: web::Path<String>,
) -> Result<HttpResponse> {
    let subscriber = parse_id(&subscriber_id, "subscriber")?;
    existing_user(store.get_ref(), subscriber, "User").await?;
    let channels = pipeline::subscribed_channels(store.get_ref(), subscriber).await?;
    Ok(ApiResponse::ok(channels, "Subscribed channels fetched successfully").into_response())
}
