#![allow(dead_code)]

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use vidtube::auth::Identity;
use vidtube::error::route_not_found;
use vidtube::media::{LocalMediaStore, MediaStore};
use vidtube::models::Video;
use vidtube::routes;
use vidtube::store::{MemoryStore, Store};

pub const PASSWORD: &str = "s3cret-pass";
const BOUNDARY: &str = "vidtube-test-boundary";

/// Everything a test app shares: the in-memory store (kept so tests can
/// seed and inspect it directly), a throwaway media directory and a cheap
/// bcrypt cost.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub media: Arc<LocalMediaStore>,
    pub media_dir: TempDir,
    pub identity: web::Data<Identity>,
}

impl TestContext {
    pub async fn new() -> Self {
        let media_dir = tempfile::tempdir().expect("tempdir");
        let media = LocalMediaStore::new(media_dir.path(), "http://localhost/media")
            .await
            .expect("media store");
        Self {
            store: Arc::new(MemoryStore::new()),
            media: Arc::new(media),
            media_dir,
            identity: web::Data::new(
                Identity::new("test-access-secret", "test-refresh-secret")
                    .with_bcrypt_cost(4)
                    .with_cookie_secure(false),
            ),
        }
    }

    pub async fn app(
        &self,
    ) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>
    {
        let store: Arc<dyn Store> = self.store.clone();
        let media: Arc<dyn MediaStore> = self.media.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::from(store))
                .app_data(web::Data::from(media))
                .app_data(self.identity.clone())
                .configure(|cfg| routes::configure(cfg, 16 * 1024 * 1024))
                .default_service(web::to(route_not_found)),
        )
        .await
    }

    pub fn media_files(&self) -> usize {
        std::fs::read_dir(self.media_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub async fn call<S>(app: &S, req: actix_http::Request) -> (StatusCode, Value)
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// A hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn attach(mut self, req: test::TestRequest) -> test::TestRequest {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        req.insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(self.body)
    }
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

pub fn register_request(username: &str) -> actix_http::Request {
    MultipartBody::new()
        .text("fullname", &format!("{} Example", username))
        .text("email", &format!("{}@x.com", username))
        .text("username", username)
        .text("password", PASSWORD)
        .file("avatar", "avatar.png", "image/png", b"\x89PNG fake avatar")
        .attach(test::TestRequest::post().uri("/api/v1/users/register"))
        .to_request()
}

/// Registers and logs in `username`, returning `(user id, access token)`.
pub async fn signed_up<S>(app: &S, username: &str) -> (Uuid, String)
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let (status, body) = call(app, register_request(username)).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": username, "password": PASSWORD }))
        .to_request();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);

    let id = body["data"]["user"]["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("user id");
    let token = body["data"]["accessToken"]
        .as_str()
        .expect("access token")
        .to_string();
    (id, token)
}

pub fn video(owner: Uuid, title: &str, minutes_ago: i64) -> Video {
    let at = Utc::now() - Duration::minutes(minutes_ago);
    Video {
        id: Uuid::new_v4(),
        owner,
        title: title.to_string(),
        description: format!("{} description", title),
        video_file: "http://localhost/media/v.mp4".into(),
        thumbnail: "http://localhost/media/t.png".into(),
        duration: 60.0,
        views: 0,
        is_published: true,
        created_at: at,
        updated_at: at,
    }
}
