use actix_multipart::form::MultipartFormConfig;
use actix_web::web;

use crate::error::{json_error, multipart_error, path_error, query_error};
use crate::handlers::{
    comments, dashboard, healthcheck, likes, playlists, subscriptions, tweets, users, videos,
};

/// Files above this size are spooled to disk instead of memory.
const MULTIPART_MEMORY_LIMIT: usize = 2 * 1024 * 1024;

/// Mounts every route under `/api/v1` along with the extractor configs that
/// turn malformed input into 400 envelopes.
pub fn configure(cfg: &mut web::ServiceConfig, max_upload_bytes: usize) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .app_data(
            MultipartFormConfig::default()
                .total_limit(max_upload_bytes)
                .memory_limit(MULTIPART_MEMORY_LIMIT)
                .error_handler(multipart_error),
        )
        .service(
            web::scope("/api/v1")
                .service(web::scope("/healthcheck").service(healthcheck::healthcheck))
                .service(
                    web::scope("/users")
                        .service(users::register)
                        .service(users::login)
                        .service(users::logout)
                        .service(users::refresh_token)
                        .service(users::get_current_user)
                        .service(users::change_password)
                        .service(users::update_account)
                        .service(users::update_avatar)
                        .service(users::update_cover_image)
                        .service(users::channel_profile)
                        .service(users::watch_history),
                )
                .service(
                    web::scope("/videos")
                        .service(videos::list_videos)
                        .service(videos::publish_video)
                        .service(videos::toggle_publish)
                        .service(videos::get_video)
                        .service(videos::update_video)
                        .service(videos::delete_video),
                )
                .service(
                    web::scope("/comments")
                        .service(comments::list_comments)
                        .service(comments::add_comment)
                        .service(comments::update_comment)
                        .service(comments::delete_comment),
                )
                .service(
                    web::scope("/tweets")
                        .service(tweets::create_tweet)
                        .service(tweets::user_tweets)
                        .service(tweets::update_tweet)
                        .service(tweets::delete_tweet),
                )
                .service(
                    web::scope("/likes")
                        .service(likes::toggle_like)
                        .service(likes::liked_videos),
                )
                .service(
                    web::scope("/playlists")
                        .service(playlists::create_playlist)
                        .service(playlists::user_playlists)
                        .service(playlists::get_playlist)
                        .service(playlists::update_playlist)
                        .service(playlists::delete_playlist)
                        .service(playlists::add_video)
                        .service(playlists::remove_video),
                )
                .service(
                    web::scope("/subscriptions")
                        .service(subscriptions::toggle_subscription)
                        .service(subscriptions::channel_subscribers)
                        .service(subscriptions::subscribed_channels),
                )
                .service(
                    web::scope("/dashboard")
                        .service(dashboard::channel_stats)
                        .service(dashboard::channel_videos),
                ),
        );
}
