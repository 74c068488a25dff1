//! HTTP handlers, one module per resource.
//!
//! Handlers validate path and body input, call the store or a read
//! pipeline, and wrap the result in [`ApiResponse`](crate::response::ApiResponse).

use actix_multipart::form::tempfile::TempFile;
use log::warn;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::pipeline::PageRequest;
use crate::store::Guarded;

pub mod comments;
pub mod dashboard;
pub mod healthcheck;
pub mod likes;
pub mod playlists;
pub mod subscriptions;
pub mod tweets;
pub mod users;
pub mod videos;

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::validation(format!("Invalid {} id", what)))
}

/// Turns the outcome of an owner-checked write into the value or a 404/403.
pub(crate) fn owned<T>(outcome: Guarded<T>, what: &str) -> Result<T> {
    match outcome {
        Guarded::Applied(value) => Ok(value),
        Guarded::NotFound => Err(ApiError::not_found(format!("{} not found", what))),
        Guarded::NotOwner => Err(ApiError::forbidden(format!(
            "You are not allowed to modify this {}",
            what.to_lowercase()
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// An uploaded form file moved next to itself with the client's file
/// extension, so media backends can tell images from videos. Removed on drop.
pub(crate) struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn from_upload(upload: TempFile, field: &str) -> Result<Self> {
        if upload.size == 0 {
            return Err(ApiError::validation(format!("{} file is empty", field)));
        }
        let mut path = upload.file.path().to_path_buf();
        if let Some(ext) = upload
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
        {
            path.set_extension(ext.to_ascii_lowercase());
        }
        upload
            .file
            .persist(&path)
            .map_err(|e| ApiError::Internal(format!("failed to stage {}: {}", field, e)))?;
        Ok(Self { path })
    }

    /// Like `from_upload`, but a missing file is a validation error.
    pub fn required(upload: Option<TempFile>, field: &str) -> Result<Self> {
        match upload {
            Some(file) => Self::from_upload(file, field),
            None => Err(ApiError::validation(format!("{} file is required", field))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged upload {}: {}", self.path.display(), e);
            }
        }
    }
}
