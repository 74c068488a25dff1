/// HTTP tests for accounts, sessions and channel profiles.
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;
use uuid::Uuid;

use common::{bearer, call, register_request, signed_up, MultipartBody, TestContext, PASSWORD};
use vidtube::auth::{ACCESS_COOKIE, REFRESH_COOKIE};
use vidtube::store::Store;

#[actix_web::test]
async fn test_register_hides_secrets() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;

    let (status, body) = call(&app, register_request("Alice")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["success"], true);

    let user = &body["data"];
    assert_eq!(user["username"], "alice");
    assert_eq!(user["email"], "alice@x.com");
    assert!(user["avatar"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost/media/"));
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("refreshToken").is_none());
    assert_eq!(ctx.media_files(), 1);
}

#[actix_web::test]
async fn test_register_rejects_duplicates_and_missing_fields() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;

    let (status, _) = call(&app, register_request("alice")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&app, register_request("alice")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"], json!([]));

    let req = MultipartBody::new()
        .text("fullname", "No Avatar")
        .text("email", "noavatar@x.com")
        .text("username", "noavatar")
        .text("password", PASSWORD)
        .attach(test::TestRequest::post().uri("/api/v1/users/register"))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Avatar file is required");
}

#[actix_web::test]
async fn test_login_sets_session_cookies() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    call(&app, register_request("alice")).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "email": "ALICE@x.com", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookies: Vec<(String, bool)> = resp
        .response()
        .cookies()
        .map(|c| (c.name().to_string(), c.http_only() == Some(true)))
        .collect();
    assert!(cookies.contains(&(ACCESS_COOKIE.to_string(), true)));
    assert!(cookies.contains(&(REFRESH_COOKIE.to_string(), true)));

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
    assert!(body["data"]["user"].get("passwordHash").is_none());
}

#[actix_web::test]
async fn test_login_rejects_wrong_password() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    call(&app, register_request("alice")).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": "alice", "password": "nope" }))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid user credentials");

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": "nobody", "password": PASSWORD }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_refresh_token_is_single_use() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    call(&app, register_request("alice")).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": "alice", "password": PASSWORD }))
        .to_request();
    let (_, body) = call(&app, req).await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .set_json(json!({ "refreshToken": refresh }))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["refreshToken"], refresh.as_str());

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .set_json(json!({ "refreshToken": refresh }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_logout_clears_refresh_token() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (id, token) = signed_up(&app, "alice").await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/logout")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let user = ctx.store.find_user(id).await.unwrap().unwrap();
    assert!(user.refresh_token.is_none());
}

#[actix_web::test]
async fn test_authentication_is_required() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;

    let req = test::TestRequest::get()
        .uri("/api/v1/users/current-user")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/users/current-user")
        .insert_header(bearer("garbage"))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/api/v1/healthcheck").to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "OK");
}

#[actix_web::test]
async fn test_change_password_requires_old_password() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (_, token) = signed_up(&app, "alice").await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/change-password")
        .insert_header(bearer(&token))
        .set_json(json!({ "oldPassword": "wrong", "newPassword": "next-pass" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/change-password")
        .insert_header(bearer(&token))
        .set_json(json!({ "oldPassword": PASSWORD, "newPassword": "next-pass" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": "alice", "password": "next-pass" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn test_update_account_rejects_taken_email() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (_, token) = signed_up(&app, "alice").await;
    signed_up(&app, "bob").await;

    let req = test::TestRequest::patch()
        .uri("/api/v1/users/update-account")
        .insert_header(bearer(&token))
        .set_json(json!({ "fullname": "Alice A", "email": "bob@x.com" }))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = test::TestRequest::patch()
        .uri("/api/v1/users/update-account")
        .insert_header(bearer(&token))
        .set_json(json!({ "fullname": "Alice A", "email": "alice@new.com" }))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "alice@new.com");
    assert_eq!(body["data"]["fullname"], "Alice A");
}

#[actix_web::test]
async fn test_channel_profile_and_subscriptions() {
    let ctx = TestContext::new().await;
    let app = ctx.app().await;
    let (alice, alice_token) = signed_up(&app, "alice").await;
    let (_, bob_token) = signed_up(&app, "bob").await;

    // Toggling three times leaves exactly one subscription.
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/subscriptions/c/{}", alice))
            .insert_header(bearer(&bob_token))
            .to_request();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(ctx.store.count_subscribers(alice).await.unwrap(), 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/users/channel/alice")
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscribersCount"], 1);
    assert_eq!(body["data"]["channelsSubscribedToCount"], 0);
    assert_eq!(body["data"]["isSubscribed"], true);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/subscriptions/c/{}", alice))
        .insert_header(bearer(&alice_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/subscriptions/c/{}", Uuid::new_v4()))
        .insert_header(bearer(&bob_token))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/subscriptions/c/{}", alice))
        .insert_header(bearer(&alice_token))
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["data"][0]["username"], "bob");
}
