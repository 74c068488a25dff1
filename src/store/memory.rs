use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountUpdate, CommentFilter, Guarded, Store, StoreResult, VideoFilter,
};
use crate::models::{
    Comment, ImageSlot, Like, LikeKind, LikeTarget, Playlist, PlaylistChanges, Subscription,
    ToggleOutcome, Tweet, User, Video, VideoChanges,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    usernames: HashMap<String, Uuid>,
    emails: HashMap<String, Uuid>,
    videos: HashMap<Uuid, Video>,
    comments: HashMap<Uuid, Comment>,
    tweets: HashMap<Uuid, Tweet>,
    playlists: HashMap<Uuid, Playlist>,
    likes: HashMap<(LikeTarget, Uuid), Like>,
    subscriptions: HashMap<(Uuid, Uuid), Subscription>,
}

/// Process-local store. Every operation holds the table lock for its whole
/// duration, which gives the same atomicity the Scylla backend gets from
/// lightweight transactions.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn guarded_mut<'a, T>(
    entry: Option<&'a mut T>,
    owner: Uuid,
    owner_of: impl Fn(&T) -> Uuid,
) -> Result<&'a mut T, Guarded<()>> {
    match entry {
        None => Err(Guarded::NotFound),
        Some(value) if owner_of(value) != owner => Err(Guarded::NotOwner),
        Some(value) => Ok(value),
    }
}

fn denied<T>(reason: Guarded<()>) -> Guarded<T> {
    match reason {
        Guarded::NotOwner => Guarded::NotOwner,
        _ => Guarded::NotFound,
    }
}

fn owned_remove<T: Clone>(
    map: &mut HashMap<Uuid, T>,
    id: Uuid,
    owner: Uuid,
    owner_of: impl Fn(&T) -> Uuid,
) -> Guarded<T> {
    match map.get(&id) {
        None => Guarded::NotFound,
        Some(value) if owner_of(value) != owner => Guarded::NotOwner,
        Some(_) => match map.remove(&id) {
            Some(value) => Guarded::Applied(value),
            None => Guarded::NotFound,
        },
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.usernames.contains_key(&user.username) || tables.emails.contains_key(&user.email)
        {
            return Ok(false);
        }
        tables.usernames.insert(user.username.clone(), user.id);
        tables.emails.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usernames
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .cloned()
            .collect())
    }

    async fn update_account(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> StoreResult<AccountUpdate> {
        let mut tables = self.tables.write().await;
        let current_email = match tables.users.get(&id) {
            Some(user) => user.email.clone(),
            None => return Ok(AccountUpdate::NotFound),
        };
        if current_email != email {
            if tables.emails.contains_key(email) {
                return Ok(AccountUpdate::EmailTaken);
            }
            tables.emails.remove(&current_email);
            tables.emails.insert(email.to_string(), id);
        }
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.fullname = fullname.to_string();
                user.email = email.to_string();
                user.updated_at = Utc::now();
                Ok(AccountUpdate::Updated(user.clone()))
            }
            None => Ok(AccountUpdate::NotFound),
        }
    }

    async fn set_user_image(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            match slot {
                ImageSlot::Avatar => user.avatar = url.to_string(),
                ImageSlot::CoverImage => user.cover_image = Some(url.to_string()),
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&id) {
            Some(user) => {
                user.refresh_token = token.map(str::to_string);
                true
            }
            None => false,
        })
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(expected) => {
                user.refresh_token = Some(next.to_string());
                true
            }
            _ => false,
        })
    }

    async fn push_watch_history(&self, id: Uuid, video: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&id) {
            user.watch_history.retain(|seen| *seen != video);
            user.watch_history.push(video);
        }
        Ok(())
    }

    async fn insert_video(&self, video: &Video) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .videos
            .insert(video.id, video.clone());
        Ok(())
    }

    async fn find_video(&self, id: Uuid) -> StoreResult<Option<Video>> {
        Ok(self.tables.read().await.videos.get(&id).cloned())
    }

    async fn find_videos(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.videos.get(id))
            .cloned()
            .collect())
    }

    async fn list_videos(&self, filter: VideoFilter) -> StoreResult<Vec<Video>> {
        let tables = self.tables.read().await;
        let mut videos: Vec<Video> = tables
            .videos
            .values()
            .filter(|v| filter.owner.map_or(true, |owner| v.owner == owner))
            .filter(|v| !filter.published_only || v.is_published)
            .cloned()
            .collect();
        videos.sort_by_key(|v| v.created_at);
        Ok(videos)
    }

    async fn update_video(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &VideoChanges,
    ) -> StoreResult<Guarded<Video>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.videos.get_mut(&id), owner, |v| v.owner) {
                Ok(video) => {
                    changes.apply(video);
                    video.updated_at = Utc::now();
                    Guarded::Applied(video.clone())
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn toggle_video_published(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<bool>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.videos.get_mut(&id), owner, |v| v.owner) {
                Ok(video) => {
                    video.is_published = !video.is_published;
                    video.updated_at = Utc::now();
                    Guarded::Applied(video.is_published)
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn delete_video(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Video>> {
        let mut tables = self.tables.write().await;
        Ok(owned_remove(&mut tables.videos, id, owner, |v| v.owner))
    }

    async fn record_view(&self, id: Uuid) -> StoreResult<()> {
        if let Some(video) = self.tables.write().await.videos.get_mut(&id) {
            video.views += 1;
        }
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .comments
            .insert(comment.id, comment.clone());
        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>> {
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn list_comments(&self, filter: CommentFilter) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| match filter {
                CommentFilter::Video(video) => c.video == video,
                CommentFilter::Owner(owner) => c.owner == owner,
            })
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    async fn update_comment(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Comment>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.comments.get_mut(&id), owner, |c| c.owner) {
                Ok(comment) => {
                    comment.content = content.to_string();
                    comment.updated_at = Utc::now();
                    Guarded::Applied(comment.clone())
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn delete_comment(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Comment>> {
        let mut tables = self.tables.write().await;
        Ok(owned_remove(&mut tables.comments, id, owner, |c| c.owner))
    }

    async fn insert_tweet(&self, tweet: &Tweet) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .tweets
            .insert(tweet.id, tweet.clone());
        Ok(())
    }

    async fn find_tweet(&self, id: Uuid) -> StoreResult<Option<Tweet>> {
        Ok(self.tables.read().await.tweets.get(&id).cloned())
    }

    async fn list_tweets(&self, owner: Uuid) -> StoreResult<Vec<Tweet>> {
        let tables = self.tables.read().await;
        let mut tweets: Vec<Tweet> = tables
            .tweets
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tweets.sort_by_key(|t| t.created_at);
        Ok(tweets)
    }

    async fn update_tweet(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Tweet>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.tweets.get_mut(&id), owner, |t| t.owner) {
                Ok(tweet) => {
                    tweet.content = content.to_string();
                    tweet.updated_at = Utc::now();
                    Guarded::Applied(tweet.clone())
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn delete_tweet(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Tweet>> {
        let mut tables = self.tables.write().await;
        Ok(owned_remove(&mut tables.tweets, id, owner, |t| t.owner))
    }

    async fn toggle_like(&self, target: LikeTarget, user: Uuid) -> StoreResult<ToggleOutcome> {
        let mut tables = self.tables.write().await;
        let key = (target, user);
        if tables.likes.remove(&key).is_some() {
            return Ok(ToggleOutcome::Removed);
        }
        tables.likes.insert(
            key,
            Like {
                target,
                liked_by: user,
                created_at: Utc::now(),
            },
        );
        Ok(ToggleOutcome::Added)
    }

    async fn has_liked(&self, target: LikeTarget, user: Uuid) -> StoreResult<bool> {
        Ok(self.tables.read().await.likes.contains_key(&(target, user)))
    }

    async fn count_likes(&self, target: LikeTarget) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.likes.keys().filter(|(t, _)| *t == target).count() as i64)
    }

    async fn like_counts(&self, kind: LikeKind, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>> {
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for (target, _) in tables.likes.keys() {
            if target.kind == kind && ids.contains(&target.id) {
                *counts.entry(target.id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn likes_by_user(&self, user: Uuid, kind: LikeKind) -> StoreResult<Vec<Like>> {
        let tables = self.tables.read().await;
        let mut likes: Vec<Like> = tables
            .likes
            .values()
            .filter(|like| like.liked_by == user && like.target.kind == kind)
            .cloned()
            .collect();
        likes.sort_by_key(|like| like.created_at);
        Ok(likes)
    }

    async fn toggle_subscription(
        &self,
        subscriber: Uuid,
        channel: Uuid,
    ) -> StoreResult<ToggleOutcome> {
        let mut tables = self.tables.write().await;
        let key = (subscriber, channel);
        if tables.subscriptions.remove(&key).is_some() {
            return Ok(ToggleOutcome::Removed);
        }
        tables.subscriptions.insert(
            key,
            Subscription {
                subscriber,
                channel,
                created_at: Utc::now(),
            },
        );
        Ok(ToggleOutcome::Added)
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .contains_key(&(subscriber, channel)))
    }

    async fn count_subscribers(&self, channel: Uuid) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .keys()
            .filter(|(_, c)| *c == channel)
            .count() as i64)
    }

    async fn count_subscriptions(&self, subscriber: Uuid) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .keys()
            .filter(|(s, _)| *s == subscriber)
            .count() as i64)
    }

    async fn subscribers_of(&self, channel: Uuid) -> StoreResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn subscriptions_of(&self, subscriber: Uuid) -> StoreResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.subscriber == subscriber)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn insert_playlist(&self, playlist: &Playlist) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .playlists
            .insert(playlist.id, playlist.clone());
        Ok(())
    }

    async fn find_playlist(&self, id: Uuid) -> StoreResult<Option<Playlist>> {
        Ok(self.tables.read().await.playlists.get(&id).cloned())
    }

    async fn list_playlists(&self, owner: Uuid) -> StoreResult<Vec<Playlist>> {
        let tables = self.tables.read().await;
        let mut playlists: Vec<Playlist> = tables
            .playlists
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        playlists.sort_by_key(|p| p.created_at);
        Ok(playlists)
    }

    async fn update_playlist(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &PlaylistChanges,
    ) -> StoreResult<Guarded<Playlist>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.playlists.get_mut(&id), owner, |p| p.owner) {
                Ok(playlist) => {
                    changes.apply(playlist);
                    playlist.updated_at = Utc::now();
                    Guarded::Applied(playlist.clone())
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn delete_playlist(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Playlist>> {
        let mut tables = self.tables.write().await;
        Ok(owned_remove(&mut tables.playlists, id, owner, |p| p.owner))
    }

    async fn add_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.playlists.get_mut(&id), owner, |p| p.owner) {
                Ok(playlist) if playlist.videos.contains(&video) => Guarded::Applied(false),
                Ok(playlist) => {
                    playlist.videos.push(video);
                    playlist.updated_at = Utc::now();
                    Guarded::Applied(true)
                }
                Err(reason) => denied(reason),
            },
        )
    }

    async fn remove_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>> {
        let mut tables = self.tables.write().await;
        Ok(
            match guarded_mut(tables.playlists.get_mut(&id), owner, |p| p.owner) {
                Ok(playlist) if !playlist.videos.contains(&video) => Guarded::Applied(false),
                Ok(playlist) => {
                    playlist.videos.retain(|v| *v != video);
                    playlist.updated_at = Utc::now();
                    Guarded::Applied(true)
                }
                Err(reason) => denied(reason),
            },
        )
    }
}
