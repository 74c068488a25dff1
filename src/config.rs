//! Configuration management.
//!
//! Loaded from environment variables (after an optional `.env` file) with
//! `envy`; every key is the upper-cased field name.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Scylla,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    Local,
    Cloudinary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP worker threads; defaults to the number of CPUs.
    pub workers: Option<usize>,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,
    #[serde(default = "default_scylla_nodes")]
    pub scylla_nodes: String,
    #[serde(default = "default_keyspace")]
    pub scylla_keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub scylla_replication_factor: u32,

    pub access_token_secret: String,
    pub refresh_token_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_media_backend")]
    pub media_backend: MediaBackend,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub nodes: String,
    pub keyspace: String,
    pub replication_factor: u32,
}

impl ScyllaConfig {
    pub fn nodes(&self) -> Vec<String> {
        self.nodes
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Scylla
}

fn default_scylla_nodes() -> String {
    "127.0.0.1:9042".to_string()
}

fn default_keyspace() -> String {
    "vidtube".to_string()
}

fn default_replication_factor() -> u32 {
    1
}

fn default_access_ttl() -> i64 {
    24 * 60 * 60
}

fn default_refresh_ttl() -> i64 {
    10 * 24 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_bcrypt_cost() -> u32 {
    10
}

fn default_media_backend() -> MediaBackend {
    MediaBackend::Local
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./public/media")
}

fn default_media_base_url() -> String {
    "/media".to_string()
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.is_empty() {
            return Err(ConfigError::Missing("ACCESS_TOKEN_SECRET"));
        }
        if self.refresh_token_secret.is_empty() {
            return Err(ConfigError::Missing("REFRESH_TOKEN_SECRET"));
        }
        if self.media_backend == MediaBackend::Cloudinary {
            self.cloudinary()?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn scylla(&self) -> ScyllaConfig {
        ScyllaConfig {
            nodes: self.scylla_nodes.clone(),
            keyspace: self.scylla_keyspace.clone(),
            replication_factor: self.scylla_replication_factor,
        }
    }

    pub fn cloudinary(&self) -> Result<CloudinaryConfig, ConfigError> {
        Ok(CloudinaryConfig {
            cloud_name: self
                .cloudinary_cloud_name
                .clone()
                .ok_or(ConfigError::Missing("CLOUDINARY_CLOUD_NAME"))?,
            api_key: self
                .cloudinary_api_key
                .clone()
                .ok_or(ConfigError::Missing("CLOUDINARY_API_KEY"))?,
            api_secret: self
                .cloudinary_api_secret
                .clone()
                .ok_or(ConfigError::Missing("CLOUDINARY_API_SECRET"))?,
        })
    }
}
