/// HTTP tests for videos, comments, tweets, likes, playlists and the
/// dashboard.
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{bearer, call, signed_up, video, MultipartBody, TestContext};
use vidtube::models::{Comment, Playlist};
use vidtube::store::{CommentFilter, Store};

#[actix_web::test]
async fn test_video_feed_pagination() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, token) = signed_up(&app, "alice").await;
    for i in 0..25 {
        ctx.store
            .insert_video(&video(alice, &format!("clip {}", i), i))
            .await
            .unwrap();
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?page=1&limit=10")
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metadata"]["totalPages"], 3);
    assert_eq!(body["data"]["metadata"]["totalItems"], 25);
    assert_eq!(body["data"]["videos"].as_array().unwrap().len(), 10);
    assert_eq!(body["data"]["videos"][0]["owner"]["username"], "alice");

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?limit=500")
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"]["metadata"]["pageSize"], 100);
    assert_eq!(body["data"]["videos"].as_array().unwrap().len(), 25);

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?limit=0&page=-2&sortBy=nonsense")
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"]["metadata"]["pageSize"], 10);
    assert_eq!(body["data"]["metadata"]["currentPage"], 1);
    assert_eq!(body["data"]["videos"][0]["title"], "clip 0");

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?userId=not-a-uuid")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_publish_video_uploads_both_files() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (_, token) = signed_up(&app, "alice").await;
    let before = ctx.media_files();

    let req = MultipartBody::new()
        .text("title", "My first video")
        .text("description", "Hello world")
        .file("videoFile", "clip.mp4", "video/mp4", b"not really a video")
        .file("thumbnail", "thumb.png", "image/png", b"not really a png")
        .attach(test::TestRequest::post().uri("/api/v1/videos"))
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["title"], "My first video");
    assert_eq!(body["data"]["isPublished"], true);
    assert_eq!(ctx.media_files(), before + 2);

    let req = MultipartBody::new()
        .text("title", "No files")
        .text("description", "Missing uploads")
        .attach(test::TestRequest::post().uri("/api/v1/videos"))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_get_video_records_view_and_history() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, _) = signed_up(&app, "alice").await;
    let (bob, bob_token) = signed_up(&app, "bob").await;
    let clip = video(alice, "clip", 1);
    ctx.store.insert_video(&clip).await.unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}", clip.id))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["views"], 1);
    assert_eq!(body["data"]["isLiked"], false);

    let bob_user = ctx.store.find_user(bob).await.unwrap().unwrap();
    assert_eq!(bob_user.watch_history, vec![clip.id]);

    let req = test::TestRequest::get()
        .uri("/api/v1/users/watch-history")
        .insert_header(bearer(&bob_token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"][0]["id"], clip.id.to_string());

    let req = test::TestRequest::get()
        .uri("/api/v1/videos/not-a-uuid")
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid video id");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}", Uuid::new_v4()))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_toggle_like_twice_restores_count() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, token) = signed_up(&app, "alice").await;
    let clip = video(alice, "clip", 1);
    ctx.store.insert_video(&clip).await.unwrap();
    let uri = format!("/api/v1/likes/toggle/video/{}", clip.id);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "liked": true, "likesCount": 1 }));

    let req = test::TestRequest::get()
        .uri("/api/v1/likes/videos")
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"], json!({ "liked": false, "likesCount": 0 }));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/likes/toggle/playlist/{}", clip.id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/likes/toggle/tweet/{}", Uuid::new_v4()))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_non_owner_cannot_mutate() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, alice_token) = signed_up(&app, "alice").await;
    let (_, bob_token) = signed_up(&app, "bob").await;

    let req = test::TestRequest::post()
        .uri("/api/v1/tweets")
        .insert_header(bearer(&alice_token))
        .set_json(json!({ "content": "original" }))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let tweet_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/tweets/{}", tweet_id))
        .insert_header(bearer(&bob_token))
        .set_json(json!({ "content": "hijacked" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/tweets/{}", tweet_id))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let tweet = ctx
        .store
        .find_tweet(Uuid::parse_str(&tweet_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tweet.content, "original");

    let clip = video(alice, "clip", 1);
    ctx.store.insert_video(&clip).await.unwrap();
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/videos/{}/toggle-publish", clip.id))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(ctx.store.find_video(clip.id).await.unwrap().unwrap().is_published);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/videos/{}/toggle-publish", clip.id))
        .insert_header(bearer(&alice_token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isPublished"], false);
}

#[actix_web::test]
async fn test_non_owner_is_forbidden_everywhere() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, _) = signed_up(&app, "alice").await;
    let (_, bob_token) = signed_up(&app, "bob").await;

    let clip = video(alice, "clip", 2);
    let other = video(alice, "other", 1);
    ctx.store.insert_video(&clip).await.unwrap();
    ctx.store.insert_video(&other).await.unwrap();
    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4(),
        video: clip.id,
        owner: alice,
        content: "mine".into(),
        created_at: now,
        updated_at: now,
    };
    ctx.store.insert_comment(&comment).await.unwrap();
    let playlist = Playlist {
        id: Uuid::new_v4(),
        owner: alice,
        name: "Faves".into(),
        description: "Best clips".into(),
        videos: vec![clip.id],
        created_at: now,
        updated_at: now,
    };
    ctx.store.insert_playlist(&playlist).await.unwrap();

    let attempts = vec![
        test::TestRequest::patch()
            .uri(&format!("/api/v1/comments/{}", comment.id))
            .set_json(json!({ "content": "hijacked" })),
        test::TestRequest::delete().uri(&format!("/api/v1/comments/{}", comment.id)),
        MultipartBody::new()
            .text("title", "hijacked")
            .attach(test::TestRequest::patch().uri(&format!("/api/v1/videos/{}", clip.id))),
        test::TestRequest::delete().uri(&format!("/api/v1/videos/{}", clip.id)),
        test::TestRequest::patch()
            .uri(&format!("/api/v1/playlists/{}", playlist.id))
            .set_json(json!({ "name": "hijacked" })),
        test::TestRequest::delete().uri(&format!("/api/v1/playlists/{}", playlist.id)),
        test::TestRequest::post().uri(&format!(
            "/api/v1/playlists/{}/videos/{}",
            playlist.id, other.id
        )),
        test::TestRequest::delete().uri(&format!(
            "/api/v1/playlists/{}/videos/{}",
            playlist.id, clip.id
        )),
    ];
    for attempt in attempts {
        let req = attempt.insert_header(bearer(&bob_token)).to_request();
        let uri = req.uri().to_string();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} -> {}", uri, body);
    }

    let stored = ctx.store.find_comment(comment.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "mine");
    let stored = ctx.store.find_video(clip.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "clip");
    let stored = ctx.store.find_playlist(playlist.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Faves");
    assert_eq!(stored.videos, vec![clip.id]);
}

#[actix_web::test]
async fn test_unpublished_video_hidden_from_non_owners() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, alice_token) = signed_up(&app, "alice").await;
    let (bob, bob_token) = signed_up(&app, "bob").await;
    let clip = video(alice, "secret", 1);
    ctx.store.insert_video(&clip).await.unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}", clip.id))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/videos/{}/toggle-publish", clip.id))
        .insert_header(bearer(&alice_token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"]["isPublished"], false);

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4(),
        video: clip.id,
        owner: alice,
        content: "first".into(),
        created_at: now,
        updated_at: now,
    };
    ctx.store.insert_comment(&comment).await.unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/users/watch-history")
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, _) = call(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/playlists")
            .insert_header(bearer(&bob_token))
            .set_json(json!({ "name": "Mine", "description": "Bob's" }))
            .to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let bobs_playlist = ctx.store.list_playlists(bob).await.unwrap()[0].id;

    let hidden = vec![
        test::TestRequest::get().uri(&format!("/api/v1/videos/{}", clip.id)),
        test::TestRequest::get().uri(&format!("/api/v1/comments/{}", clip.id)),
        test::TestRequest::post()
            .uri(&format!("/api/v1/comments/{}", clip.id))
            .set_json(json!({ "content": "sneaky" })),
        test::TestRequest::post().uri(&format!("/api/v1/likes/toggle/video/{}", clip.id)),
        test::TestRequest::post().uri(&format!("/api/v1/likes/toggle/comment/{}", comment.id)),
        test::TestRequest::post().uri(&format!(
            "/api/v1/playlists/{}/videos/{}",
            bobs_playlist, clip.id
        )),
    ];
    for attempt in hidden {
        let req = attempt.insert_header(bearer(&bob_token)).to_request();
        let uri = req.uri().to_string();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} -> {}", uri, body);
    }
    let comments = ctx
        .store
        .list_comments(CommentFilter::Video(clip.id))
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);

    // The owner still sees and engages with it.
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/comments/{}", clip.id))
        .insert_header(bearer(&alice_token))
        .set_json(json!({ "content": "note to self" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}", clip.id))
        .insert_header(bearer(&alice_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn test_comments_flow() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, token) = signed_up(&app, "alice").await;
    let clip = video(alice, "clip", 1);
    ctx.store.insert_video(&clip).await.unwrap();

    for content in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/comments/{}", clip.id))
            .insert_header(bearer(&token))
            .set_json(json!({ "content": content }))
            .to_request();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/comments/{}", clip.id))
        .insert_header(bearer(&token))
        .set_json(json!({ "content": "   " }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/comments/{}", Uuid::new_v4()))
        .insert_header(bearer(&token))
        .set_json(json!({ "content": "orphan" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/comments/{}?limit=1", clip.id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metadata"]["totalPages"], 2);
    assert_eq!(body["data"]["comments"][0]["likesCount"], 0);
    assert_eq!(body["data"]["comments"][0]["owner"]["username"], "alice");
}

#[actix_web::test]
async fn test_playlist_membership() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, token) = signed_up(&app, "alice").await;
    let clip = video(alice, "clip", 1);
    ctx.store.insert_video(&clip).await.unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/playlists")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "Faves", "description": "Best clips" }))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let playlist = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/playlists/{}/videos/{}", playlist, clip.id);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalVideos"], 1);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalVideos"], 0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/playlists/user/{}", alice))
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"][0]["name"], "Faves");
}

#[actix_web::test]
async fn test_dashboard_stats_default_to_zero() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (_, token) = signed_up(&app, "alice").await;

    let req = test::TestRequest::get()
        .uri("/api/v1/dashboard/stats")
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "totalVideos": 0,
            "totalVideoViews": 0,
            "totalSubscribers": 0,
            "totalVideoLikes": 0,
            "totalTweetLikes": 0,
            "totalCommentLikes": 0
        })
    );

    let req = test::TestRequest::get()
        .uri("/api/v1/dashboard/videos")
        .insert_header(bearer(&token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"], json!([]));
}

#[actix_web::test]
async fn test_unknown_route_returns_envelope() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;

    let req = test::TestRequest::get().uri("/api/v1/nothing-here").to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 404);
}
