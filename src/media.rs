//! Object storage for uploaded media.
//!
//! Handlers only depend on [`MediaStore`]: upload a local file, get back a
//! public URL (and a duration for videos), and remove it again when a
//! dependent write fails.

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::CloudinaryConfig;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub resource_type: String,
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<UploadedMedia, MediaError>;
    async fn remove(&self, media: &UploadedMedia) -> Result<(), MediaError>;
}

/// Uploads both files concurrently. If either upload fails, the one that
/// succeeded is removed again and the first error is returned.
pub async fn upload_pair(
    store: &dyn MediaStore,
    first: &Path,
    second: &Path,
) -> Result<(UploadedMedia, UploadedMedia), MediaError> {
    let (a, b) = futures::join!(store.upload(first), store.upload(second));
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Ok(orphan), Err(e)) | (Err(e), Ok(orphan)) => {
            discard(store, &orphan).await;
            Err(e)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

/// Best-effort removal used on rollback paths.
pub async fn discard(store: &dyn MediaStore, media: &UploadedMedia) {
    if let Err(e) = store.remove(media).await {
        warn!("Failed to remove orphaned upload {}: {}", media.public_id, e);
    }
}

/// Copies uploads into a directory served under `base_url`.
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub async fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self, MediaError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn resource_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4" | "mov" | "webm" | "mkv" | "avi") => "video",
        Some("png" | "jpg" | "jpeg" | "gif" | "webp") => "image",
        _ => "raw",
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, path: &Path) -> Result<UploadedMedia, MediaError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let public_id = format!("{}{}", Uuid::new_v4(), extension);
        tokio::fs::copy(path, self.root.join(&public_id)).await?;

        Ok(UploadedMedia {
            url: format!("{}/{}", self.base_url, public_id),
            resource_type: resource_type_for(path).to_string(),
            public_id,
            duration: None,
        })
    }

    async fn remove(&self, media: &UploadedMedia) -> Result<(), MediaError> {
        match tokio::fs::remove_file(self.root.join(&media.public_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    secure_url: String,
    public_id: String,
    resource_type: String,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryFailure {
    error: CloudinaryMessage,
}

#[derive(Debug, Deserialize)]
struct CloudinaryMessage {
    message: String,
}

/// Cloudinary's signed upload API.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/{}/{}",
            self.config.cloud_name, resource_type, action
        )
    }

    /// Parameters are signed in alphabetical order, joined with `&`, with
    /// the API secret appended.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha1::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn rejected(response: reqwest::Response) -> MediaError {
        let status = response.status();
        match response.json::<CloudinaryFailure>().await {
            Ok(body) => MediaError::Rejected(body.error.message),
            Err(_) => MediaError::Rejected(format!("status {}", status)),
        }
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, path: &Path) -> Result<UploadedMedia, MediaError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("timestamp", &timestamp)]);

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let body: CloudinaryUpload = response.json().await?;
        info!("Uploaded {} to Cloudinary as {}", path.display(), body.public_id);
        Ok(UploadedMedia {
            url: body.secure_url,
            public_id: body.public_id,
            resource_type: body.resource_type,
            duration: body.duration,
        })
    }

    async fn remove(&self, media: &UploadedMedia) -> Result<(), MediaError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("public_id", &media.public_id),
            ("timestamp", &timestamp),
        ]);
        let params = [
            ("public_id", media.public_id.as_str()),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("signature", signature.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint(&media.resource_type, "destroy"))
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails every upload whose file name contains "bad".
    #[derive(Default)]
    struct FlakyStore {
        uploads: AtomicUsize,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaStore for FlakyStore {
        async fn upload(&self, path: &Path) -> Result<UploadedMedia, MediaError> {
            let name = path.to_string_lossy().to_string();
            if name.contains("bad") {
                return Err(MediaError::Rejected("bad file".into()));
            }
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(UploadedMedia {
                url: format!("http://cdn/{}", name),
                public_id: name,
                resource_type: "raw".into(),
                duration: Some(3.0),
            })
        }

        async fn remove(&self, media: &UploadedMedia) -> Result<(), MediaError> {
            self.removed.lock().unwrap().push(media.public_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn partial_pair_upload_rolls_back_the_survivor() {
        let store = FlakyStore::default();
        let result = upload_pair(&store, Path::new("good.mp4"), Path::new("bad.png")).await;
        assert!(result.is_err());
        assert_eq!(*store.removed.lock().unwrap(), vec!["good.mp4".to_string()]);
    }

    #[tokio::test]
    async fn full_pair_upload_keeps_both() {
        let store = FlakyStore::default();
        let (video, thumb) = upload_pair(&store, Path::new("a.mp4"), Path::new("b.png"))
            .await
            .unwrap();
        assert_eq!(video.duration, Some(3.0));
        assert_eq!(thumb.public_id, "b.png");
        assert!(store.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_store_copies_and_removes_files() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("clip.mp4");
        tokio::fs::write(&source, b"frames").await.unwrap();

        let store = LocalMediaStore::new(root.path().join("media"), "http://localhost/media/")
            .await
            .unwrap();
        let uploaded = store.upload(&source).await.unwrap();
        assert!(uploaded.url.starts_with("http://localhost/media/"));
        assert_eq!(uploaded.resource_type, "video");

        let stored = root.path().join("media").join(&uploaded.public_id);
        assert!(stored.exists());
        store.remove(&uploaded).await.unwrap();
        assert!(!stored.exists());
        // Removing twice is harmless.
        store.remove(&uploaded).await.unwrap();
    }

    #[test]
    fn signature_sorts_parameters() {
        let store = CloudinaryStore::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        });
        let a = store.sign(&[("timestamp", "1"), ("public_id", "x")]);
        let b = store.sign(&[("public_id", "x"), ("timestamp", "1")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }
}
