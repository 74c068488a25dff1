//! Persistence boundary.
//!
//! Every handler and pipeline talks to a `dyn Store`. Two backends implement
//! it: [`scylla::ScyllaStore`] for deployments and [`memory::MemoryStore`]
//! for local development and tests. Both implement toggles and owner-checked
//! writes as single conditional operations, so the read-then-write race of a
//! separate existence check cannot occur.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Comment, ImageSlot, Like, LikeKind, LikeTarget, Playlist, PlaylistChanges, Subscription,
    ToggleOutcome, Tweet, User, Video, VideoChanges,
};

pub mod memory;
pub mod scylla;

pub use self::memory::MemoryStore;
pub use self::scylla::ScyllaStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] ::scylla::transport::errors::QueryError),

    #[error("session setup failed: {0}")]
    Session(#[from] ::scylla::transport::errors::NewSessionError),

    #[error("unexpected row shape: {0}")]
    Decode(String),

    #[error("write contention on {0}")]
    Contention(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a write that is only allowed for the entity's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Applied(T),
    NotFound,
    NotOwner,
}

impl<T> Guarded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Guarded<U> {
        match self {
            Guarded::Applied(value) => Guarded::Applied(f(value)),
            Guarded::NotFound => Guarded::NotFound,
            Guarded::NotOwner => Guarded::NotOwner,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AccountUpdate {
    Updated(User),
    EmailTaken,
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoFilter {
    pub owner: Option<Uuid>,
    pub published_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentFilter {
    Video(Uuid),
    Owner(Uuid),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts the user unless its username or email is already claimed.
    async fn create_user(&self, user: &User) -> StoreResult<bool>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>>;
    async fn update_account(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> StoreResult<AccountUpdate>;
    async fn set_user_image(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> StoreResult<Option<User>>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool>;
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool>;
    /// Replaces the stored refresh token only if it still equals `expected`.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool>;
    /// Moves `video` to the most recent end of the user's watch history.
    async fn push_watch_history(&self, id: Uuid, video: Uuid) -> StoreResult<()>;

    async fn insert_video(&self, video: &Video) -> StoreResult<()>;
    async fn find_video(&self, id: Uuid) -> StoreResult<Option<Video>>;
    async fn find_videos(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>>;
    async fn list_videos(&self, filter: VideoFilter) -> StoreResult<Vec<Video>>;
    async fn update_video(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &VideoChanges,
    ) -> StoreResult<Guarded<Video>>;
    /// Flips the published flag and returns the new value.
    async fn toggle_video_published(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<bool>>;
    async fn delete_video(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Video>>;
    async fn record_view(&self, id: Uuid) -> StoreResult<()>;

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()>;
    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>>;
    async fn list_comments(&self, filter: CommentFilter) -> StoreResult<Vec<Comment>>;
    async fn update_comment(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Comment>>;
    async fn delete_comment(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Comment>>;

    async fn insert_tweet(&self, tweet: &Tweet) -> StoreResult<()>;
    async fn find_tweet(&self, id: Uuid) -> StoreResult<Option<Tweet>>;
    async fn list_tweets(&self, owner: Uuid) -> StoreResult<Vec<Tweet>>;
    async fn update_tweet(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Tweet>>;
    async fn delete_tweet(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Tweet>>;

    async fn toggle_like(&self, target: LikeTarget, user: Uuid) -> StoreResult<ToggleOutcome>;
    async fn has_liked(&self, target: LikeTarget, user: Uuid) -> StoreResult<bool>;
    async fn count_likes(&self, target: LikeTarget) -> StoreResult<i64>;
    /// Like counts keyed by target id; ids without likes are absent.
    async fn like_counts(&self, kind: LikeKind, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>>;
    async fn likes_by_user(&self, user: Uuid, kind: LikeKind) -> StoreResult<Vec<Like>>;

    async fn toggle_subscription(
        &self,
        subscriber: Uuid,
        channel: Uuid,
    ) -> StoreResult<ToggleOutcome>;
    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> StoreResult<bool>;
    async fn count_subscribers(&self, channel: Uuid) -> StoreResult<i64>;
    async fn count_subscriptions(&self, subscriber: Uuid) -> StoreResult<i64>;
    async fn subscribers_of(&self, channel: Uuid) -> StoreResult<Vec<Subscription>>;
    async fn subscriptions_of(&self, subscriber: Uuid) -> StoreResult<Vec<Subscription>>;

    async fn insert_playlist(&self, playlist: &Playlist) -> StoreResult<()>;
    async fn find_playlist(&self, id: Uuid) -> StoreResult<Option<Playlist>>;
    async fn list_playlists(&self, owner: Uuid) -> StoreResult<Vec<Playlist>>;
    async fn update_playlist(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &PlaylistChanges,
    ) -> StoreResult<Guarded<Playlist>>;
    async fn delete_playlist(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Playlist>>;
    /// `Applied(false)` when the video is already in the playlist.
    async fn add_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>>;
    /// `Applied(false)` when the video was not in the playlist.
    async fn remove_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>>;
}
