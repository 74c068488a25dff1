use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, warn};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::frame::value::{CqlTimestamp, MaybeUnset};
use scylla::{QueryResult, Session};
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

use super::{
    AccountUpdate, CommentFilter, Guarded, Store, StoreError, StoreResult, VideoFilter,
};
use crate::models::{
    Comment, ImageSlot, Like, LikeKind, LikeTarget, Playlist, PlaylistChanges, Subscription,
    ToggleOutcome, Tweet, User, Video, VideoChanges,
};

/// Upper bound on ids bound into a single `IN ?` restriction.
const IN_CHUNK: usize = 100;
/// Compare-and-set attempts before giving up on a hot row.
const CAS_ATTEMPTS: usize = 3;

const RELEASE_USERNAME: &str = "DELETE FROM usernames WHERE username = ? IF user_id = ?";
const RELEASE_EMAIL: &str = "DELETE FROM emails WHERE email = ? IF user_id = ?";

const USER_COLUMNS: &str = "user_id, username, email, fullname, avatar, cover_image, \
     watch_history, password_hash, refresh_token, created_at, updated_at";
const VIDEO_COLUMNS: &str = "video_id, owner_id, title, description, video_file, thumbnail, \
     duration, is_published, created_at, updated_at";
const COMMENT_COLUMNS: &str = "comment_id, video_id, owner_id, content, created_at, updated_at";
const TWEET_COLUMNS: &str = "tweet_id, owner_id, content, created_at, updated_at";
const PLAYLIST_COLUMNS: &str =
    "playlist_id, owner_id, name, description, videos, created_at, updated_at";

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn view_counts(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>> {
        let mut counts = HashMap::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let result = self
                .session
                .query(
                    "SELECT video_id, views FROM video_views WHERE video_id IN ?",
                    (chunk.to_vec(),),
                )
                .await?;
            for row in rows(result) {
                let id = uuid_at(&row, 0)?;
                let views = match column(&row, 1) {
                    Some(CqlValue::Counter(counter)) => counter.0,
                    _ => 0,
                };
                counts.insert(id, views);
            }
        }
        Ok(counts)
    }

    /// Drops a handle claim, but only while `user_id` still owns it.
    async fn release_claim(&self, query: &str, key: &str, user_id: Uuid) -> StoreResult<()> {
        self.session.query(query, (key, user_id)).await?;
        Ok(())
    }

    async fn with_views(&self, mut videos: Vec<Video>) -> StoreResult<Vec<Video>> {
        let ids: Vec<Uuid> = videos.iter().map(|v| v.id).collect();
        let counts = self.view_counts(&ids).await?;
        for video in &mut videos {
            video.views = counts.get(&video.id).copied().unwrap_or(0);
        }
        Ok(videos)
    }

    async fn user_id_for(&self, query: &str, key: &str) -> StoreResult<Option<Uuid>> {
        let result = self.session.query(query, (key,)).await?;
        rows(result)
            .first()
            .map(|row| uuid_at(row, 0))
            .transpose()
    }

    async fn count(&self, query: &str, key: Uuid) -> StoreResult<i64> {
        let result = self.session.query(query, (key,)).await?;
        Ok(rows(result)
            .first()
            .and_then(|row| column(row, 0))
            .and_then(CqlValue::as_bigint)
            .unwrap_or(0))
    }

    async fn select_subscriptions(&self, query: &str, key: Uuid) -> StoreResult<Vec<Subscription>> {
        let result = self.session.query(query, (key,)).await?;
        let mut subs = rows(result)
            .iter()
            .map(|row| {
                Ok(Subscription {
                    channel: uuid_at(row, 0)?,
                    subscriber: uuid_at(row, 1)?,
                    created_at: timestamp_at(row, 2)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }
}

fn rows(result: QueryResult) -> Vec<Row> {
    result.rows.unwrap_or_default()
}

fn column(row: &Row, idx: usize) -> Option<&CqlValue> {
    row.columns.get(idx).and_then(|c| c.as_ref())
}

fn uuid_at(row: &Row, idx: usize) -> StoreResult<Uuid> {
    column(row, idx)
        .and_then(CqlValue::as_uuid)
        .ok_or_else(|| StoreError::Decode(format!("column {} is not a uuid", idx)))
}

fn text_at(row: &Row, idx: usize) -> StoreResult<String> {
    opt_text_at(row, idx).ok_or_else(|| StoreError::Decode(format!("column {} is not text", idx)))
}

fn opt_text_at(row: &Row, idx: usize) -> Option<String> {
    column(row, idx).and_then(CqlValue::as_text).cloned()
}

fn uuid_list_at(row: &Row, idx: usize) -> Vec<Uuid> {
    column(row, idx)
        .and_then(CqlValue::as_list)
        .map(|items| items.iter().filter_map(CqlValue::as_uuid).collect())
        .unwrap_or_default()
}

fn timestamp_at(row: &Row, idx: usize) -> StoreResult<DateTime<Utc>> {
    match column(row, idx) {
        Some(CqlValue::Timestamp(ts)) => Ok(from_cql_timestamp(*ts)),
        _ => Err(StoreError::Decode(format!("column {} is not a timestamp", idx))),
    }
}

fn to_cql_timestamp(at: DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(at.timestamp_millis())
}

fn from_cql_timestamp(ts: CqlTimestamp) -> DateTime<Utc> {
    let seconds = ts.0.div_euclid(1000);
    let nanos = (ts.0.rem_euclid(1000) * 1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap_or_default()
}

/// Reads the `[applied]` column of a lightweight transaction.
fn applied(result: &QueryResult) -> StoreResult<bool> {
    result
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| column(row, 0))
        .and_then(CqlValue::as_boolean)
        .ok_or_else(|| StoreError::Decode("missing [applied] column".into()))
}

/// Explains why an `IF owner_id = ?` condition did not apply. Scylla echoes
/// the current `owner_id` after `[applied]`, or null when the row is gone.
fn owner_miss<T>(result: &QueryResult) -> Guarded<T> {
    let current_owner = result
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| column(row, 1))
        .and_then(CqlValue::as_uuid);
    match current_owner {
        Some(_) => Guarded::NotOwner,
        None => Guarded::NotFound,
    }
}

fn unset_or(value: &Option<String>) -> MaybeUnset<&str> {
    match value {
        Some(v) => MaybeUnset::Set(v.as_str()),
        None => MaybeUnset::Unset,
    }
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: text_at(row, 1)?,
        email: text_at(row, 2)?,
        fullname: text_at(row, 3)?,
        avatar: text_at(row, 4)?,
        cover_image: opt_text_at(row, 5),
        watch_history: uuid_list_at(row, 6),
        password_hash: text_at(row, 7)?,
        refresh_token: opt_text_at(row, 8),
        created_at: timestamp_at(row, 9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn video_from_row(row: &Row) -> StoreResult<Video> {
    Ok(Video {
        id: uuid_at(row, 0)?,
        owner: uuid_at(row, 1)?,
        title: text_at(row, 2)?,
        description: text_at(row, 3)?,
        video_file: text_at(row, 4)?,
        thumbnail: text_at(row, 5)?,
        duration: column(row, 6).and_then(CqlValue::as_double).unwrap_or(0.0),
        views: 0,
        is_published: column(row, 7).and_then(CqlValue::as_boolean).unwrap_or(false),
        created_at: timestamp_at(row, 8)?,
        updated_at: timestamp_at(row, 9)?,
    })
}

fn comment_from_row(row: &Row) -> StoreResult<Comment> {
    Ok(Comment {
        id: uuid_at(row, 0)?,
        video: uuid_at(row, 1)?,
        owner: uuid_at(row, 2)?,
        content: text_at(row, 3)?,
        created_at: timestamp_at(row, 4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

fn tweet_from_row(row: &Row) -> StoreResult<Tweet> {
    Ok(Tweet {
        id: uuid_at(row, 0)?,
        owner: uuid_at(row, 1)?,
        content: text_at(row, 2)?,
        created_at: timestamp_at(row, 3)?,
        updated_at: timestamp_at(row, 4)?,
    })
}

fn playlist_from_row(row: &Row) -> StoreResult<Playlist> {
    let mut videos = uuid_list_at(row, 4);
    // A racing append can leave a duplicate behind; keep the first position.
    let mut seen = std::collections::HashSet::new();
    videos.retain(|id| seen.insert(*id));
    Ok(Playlist {
        id: uuid_at(row, 0)?,
        owner: uuid_at(row, 1)?,
        name: text_at(row, 2)?,
        description: text_at(row, 3)?,
        videos,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

fn like_from_row(row: &Row) -> StoreResult<Option<Like>> {
    let kind = match text_at(row, 0)?.parse::<LikeKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Skipping like row: {}", e);
            return Ok(None);
        }
    };
    Ok(Some(Like {
        target: LikeTarget {
            kind,
            id: uuid_at(row, 1)?,
        },
        liked_by: uuid_at(row, 2)?,
        created_at: timestamp_at(row, 3)?,
    }))
}

/// Runs `undo` when `outcome` is an error and hands the original result
/// back. A failed undo is logged; the caller still sees the first error.
async fn undo_on_error<T, E, U>(outcome: Result<T, E>, undo: U) -> StoreResult<T>
where
    E: Into<StoreError>,
    U: Future<Output = StoreResult<()>>,
{
    match outcome {
        Ok(value) => Ok(value),
        Err(err) => {
            let err = err.into();
            if let Err(undo_err) = undo.await {
                warn!("Could not undo after failed write ({}): {}", err, undo_err);
            }
            Err(err)
        }
    }
}

fn decode_all<T>(result: QueryResult, decode: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows(result).iter().map(decode).collect()
}

#[async_trait]
impl Store for ScyllaStore {
    async fn create_user(&self, user: &User) -> StoreResult<bool> {
        let claimed = self
            .session
            .query(
                "INSERT INTO usernames (username, user_id) VALUES (?, ?) IF NOT EXISTS",
                (&user.username, user.id),
            )
            .await?;
        if !applied(&claimed)? {
            return Ok(false);
        }

        let claimed = self
            .session
            .query(
                "INSERT INTO emails (email, user_id) VALUES (?, ?) IF NOT EXISTS",
                (&user.email, user.id),
            )
            .await?;
        if !applied(&claimed)? {
            self.release_claim(RELEASE_USERNAME, &user.username, user.id)
                .await?;
            return Ok(false);
        }

        let inserted = self
            .session
            .query(
                format!(
                    "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    USER_COLUMNS
                ),
                (
                    user.id,
                    &user.username,
                    &user.email,
                    &user.fullname,
                    &user.avatar,
                    user.cover_image.as_deref(),
                    user.watch_history.clone(),
                    &user.password_hash,
                    user.refresh_token.as_deref(),
                    to_cql_timestamp(user.created_at),
                    to_cql_timestamp(user.updated_at),
                ),
            )
            .await;
        undo_on_error(inserted, async {
            self.release_claim(RELEASE_USERNAME, &user.username, user.id)
                .await?;
            self.release_claim(RELEASE_EMAIL, &user.email, user.id).await
        })
        .await?;
        Ok(true)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS),
                (id,),
            )
            .await?;
        rows(result).first().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        match self
            .user_id_for("SELECT user_id FROM usernames WHERE username = ?", username)
            .await?
        {
            Some(id) => self.find_user(id).await,
            None => Ok(None),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        match self
            .user_id_for("SELECT user_id FROM emails WHERE email = ?", email)
            .await?
        {
            Some(id) => self.find_user(id).await,
            None => Ok(None),
        }
    }

    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let result = self
                .session
                .query(
                    format!("SELECT {} FROM users WHERE user_id IN ?", USER_COLUMNS),
                    (chunk.to_vec(),),
                )
                .await?;
            users.extend(decode_all(result, user_from_row)?);
        }
        Ok(users)
    }

    async fn update_account(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> StoreResult<AccountUpdate> {
        let current = match self.find_user(id).await? {
            Some(user) => user,
            None => return Ok(AccountUpdate::NotFound),
        };

        let email_changed = current.email != email;
        if email_changed {
            let claimed = self
                .session
                .query(
                    "INSERT INTO emails (email, user_id) VALUES (?, ?) IF NOT EXISTS",
                    (email, id),
                )
                .await?;
            if !applied(&claimed)? {
                return Ok(AccountUpdate::EmailTaken);
            }
        }

        let updated = self
            .session
            .query(
                "UPDATE users SET fullname = ?, email = ?, updated_at = ? WHERE user_id = ?",
                (fullname, email, to_cql_timestamp(Utc::now()), id),
            )
            .await;
        undo_on_error(updated, async {
            if email_changed {
                self.release_claim(RELEASE_EMAIL, email, id).await?;
            }
            Ok::<_, StoreError>(())
        })
        .await?;

        if email_changed {
            self.release_claim(RELEASE_EMAIL, &current.email, id).await?;
        }

        Ok(match self.find_user(id).await? {
            Some(user) => AccountUpdate::Updated(user),
            None => AccountUpdate::NotFound,
        })
    }

    async fn set_user_image(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> StoreResult<Option<User>> {
        let statement = match slot {
            ImageSlot::Avatar => {
                "UPDATE users SET avatar = ?, updated_at = ? WHERE user_id = ? IF EXISTS"
            }
            ImageSlot::CoverImage => {
                "UPDATE users SET cover_image = ?, updated_at = ? WHERE user_id = ? IF EXISTS"
            }
        };
        let result = self
            .session
            .query(statement, (url, to_cql_timestamp(Utc::now()), id))
            .await?;
        if !applied(&result)? {
            return Ok(None);
        }
        self.find_user(id).await
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                "UPDATE users SET password_hash = ?, updated_at = ? WHERE user_id = ? IF EXISTS",
                (password_hash, to_cql_timestamp(Utc::now()), id),
            )
            .await?;
        applied(&result)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                "UPDATE users SET refresh_token = ? WHERE user_id = ? IF EXISTS",
                (token, id),
            )
            .await?;
        applied(&result)
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                "UPDATE users SET refresh_token = ? WHERE user_id = ? IF refresh_token = ?",
                (next, id, expected),
            )
            .await?;
        applied(&result)
    }

    async fn push_watch_history(&self, id: Uuid, video: Uuid) -> StoreResult<()> {
        self.session
            .query(
                "UPDATE users SET watch_history = watch_history - ? WHERE user_id = ?",
                (vec![video], id),
            )
            .await?;
        self.session
            .query(
                "UPDATE users SET watch_history = watch_history + ? WHERE user_id = ?",
                (vec![video], id),
            )
            .await?;
        Ok(())
    }

    async fn insert_video(&self, video: &Video) -> StoreResult<()> {
        self.session
            .query(
                format!(
                    "INSERT INTO videos ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    VIDEO_COLUMNS
                ),
                (
                    video.id,
                    video.owner,
                    &video.title,
                    &video.description,
                    &video.video_file,
                    &video.thumbnail,
                    video.duration,
                    video.is_published,
                    to_cql_timestamp(video.created_at),
                    to_cql_timestamp(video.updated_at),
                ),
            )
            .await?;
        Ok(())
    }

    async fn find_video(&self, id: Uuid) -> StoreResult<Option<Video>> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM videos WHERE video_id = ?", VIDEO_COLUMNS),
                (id,),
            )
            .await?;
        match rows(result).first().map(video_from_row).transpose()? {
            Some(video) => Ok(self.with_views(vec![video]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_videos(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>> {
        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let result = self
                .session
                .query(
                    format!("SELECT {} FROM videos WHERE video_id IN ?", VIDEO_COLUMNS),
                    (chunk.to_vec(),),
                )
                .await?;
            videos.extend(decode_all(result, video_from_row)?);
        }
        self.with_views(videos).await
    }

    async fn list_videos(&self, filter: VideoFilter) -> StoreResult<Vec<Video>> {
        let result = match (filter.owner, filter.published_only) {
            (Some(owner), true) => {
                self.session
                    .query(
                        format!(
                            "SELECT {} FROM videos WHERE owner_id = ? AND is_published = ? \
                             ALLOW FILTERING",
                            VIDEO_COLUMNS
                        ),
                        (owner, true),
                    )
                    .await?
            }
            (Some(owner), false) => {
                self.session
                    .query(
                        format!(
                            "SELECT {} FROM videos WHERE owner_id = ? ALLOW FILTERING",
                            VIDEO_COLUMNS
                        ),
                        (owner,),
                    )
                    .await?
            }
            (None, true) => {
                self.session
                    .query(
                        format!(
                            "SELECT {} FROM videos WHERE is_published = ? ALLOW FILTERING",
                            VIDEO_COLUMNS
                        ),
                        (true,),
                    )
                    .await?
            }
            (None, false) => {
                self.session
                    .query(format!("SELECT {} FROM videos", VIDEO_COLUMNS), &[])
                    .await?
            }
        };
        let videos = decode_all(result, video_from_row)?;
        debug!("list_videos {:?} matched {} rows", filter, videos.len());
        self.with_views(videos).await
    }

    async fn update_video(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &VideoChanges,
    ) -> StoreResult<Guarded<Video>> {
        let result = self
            .session
            .query(
                "UPDATE videos SET title = ?, description = ?, thumbnail = ?, updated_at = ? \
                 WHERE video_id = ? IF owner_id = ?",
                (
                    unset_or(&changes.title),
                    unset_or(&changes.description),
                    unset_or(&changes.thumbnail),
                    to_cql_timestamp(Utc::now()),
                    id,
                    owner,
                ),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(match self.find_video(id).await? {
            Some(video) => Guarded::Applied(video),
            None => Guarded::NotFound,
        })
    }

    async fn toggle_video_published(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<bool>> {
        for _ in 0..CAS_ATTEMPTS {
            let current = match self.find_video(id).await? {
                Some(video) if video.owner != owner => return Ok(Guarded::NotOwner),
                Some(video) => video.is_published,
                None => return Ok(Guarded::NotFound),
            };
            let result = self
                .session
                .query(
                    "UPDATE videos SET is_published = ?, updated_at = ? \
                     WHERE video_id = ? IF owner_id = ? AND is_published = ?",
                    (!current, to_cql_timestamp(Utc::now()), id, owner, current),
                )
                .await?;
            if applied(&result)? {
                return Ok(Guarded::Applied(!current));
            }
            debug!("Publish flag of video {} changed underneath, retrying", id);
        }
        Err(StoreError::Contention(format!("video {}", id)))
    }

    async fn delete_video(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Video>> {
        let video = match self.find_video(id).await? {
            Some(video) => video,
            None => return Ok(Guarded::NotFound),
        };
        let result = self
            .session
            .query(
                "DELETE FROM videos WHERE video_id = ? IF owner_id = ?",
                (id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        self.session
            .query("DELETE FROM video_views WHERE video_id = ?", (id,))
            .await?;
        Ok(Guarded::Applied(video))
    }

    async fn record_view(&self, id: Uuid) -> StoreResult<()> {
        self.session
            .query(
                "UPDATE video_views SET views = views + 1 WHERE video_id = ?",
                (id,),
            )
            .await?;
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        self.session
            .query(
                format!(
                    "INSERT INTO comments ({}) VALUES (?, ?, ?, ?, ?, ?)",
                    COMMENT_COLUMNS
                ),
                (
                    comment.id,
                    comment.video,
                    comment.owner,
                    &comment.content,
                    to_cql_timestamp(comment.created_at),
                    to_cql_timestamp(comment.updated_at),
                ),
            )
            .await?;
        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM comments WHERE comment_id = ?", COMMENT_COLUMNS),
                (id,),
            )
            .await?;
        rows(result).first().map(comment_from_row).transpose()
    }

    async fn list_comments(&self, filter: CommentFilter) -> StoreResult<Vec<Comment>> {
        let (column_name, key) = match filter {
            CommentFilter::Video(video) => ("video_id", video),
            CommentFilter::Owner(owner) => ("owner_id", owner),
        };
        let result = self
            .session
            .query(
                format!(
                    "SELECT {} FROM comments WHERE {} = ? ALLOW FILTERING",
                    COMMENT_COLUMNS, column_name
                ),
                (key,),
            )
            .await?;
        decode_all(result, comment_from_row)
    }

    async fn update_comment(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Comment>> {
        let result = self
            .session
            .query(
                "UPDATE comments SET content = ?, updated_at = ? WHERE comment_id = ? \
                 IF owner_id = ?",
                (content, to_cql_timestamp(Utc::now()), id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(match self.find_comment(id).await? {
            Some(comment) => Guarded::Applied(comment),
            None => Guarded::NotFound,
        })
    }

    async fn delete_comment(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Comment>> {
        let comment = match self.find_comment(id).await? {
            Some(comment) => comment,
            None => return Ok(Guarded::NotFound),
        };
        let result = self
            .session
            .query(
                "DELETE FROM comments WHERE comment_id = ? IF owner_id = ?",
                (id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(Guarded::Applied(comment))
    }

    async fn insert_tweet(&self, tweet: &Tweet) -> StoreResult<()> {
        self.session
            .query(
                format!("INSERT INTO tweets ({}) VALUES (?, ?, ?, ?, ?)", TWEET_COLUMNS),
                (
                    tweet.id,
                    tweet.owner,
                    &tweet.content,
                    to_cql_timestamp(tweet.created_at),
                    to_cql_timestamp(tweet.updated_at),
                ),
            )
            .await?;
        Ok(())
    }

    async fn find_tweet(&self, id: Uuid) -> StoreResult<Option<Tweet>> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM tweets WHERE tweet_id = ?", TWEET_COLUMNS),
                (id,),
            )
            .await?;
        rows(result).first().map(tweet_from_row).transpose()
    }

    async fn list_tweets(&self, owner: Uuid) -> StoreResult<Vec<Tweet>> {
        let result = self
            .session
            .query(
                format!(
                    "SELECT {} FROM tweets WHERE owner_id = ? ALLOW FILTERING",
                    TWEET_COLUMNS
                ),
                (owner,),
            )
            .await?;
        decode_all(result, tweet_from_row)
    }

    async fn update_tweet(
        &self,
        id: Uuid,
        owner: Uuid,
        content: &str,
    ) -> StoreResult<Guarded<Tweet>> {
        let result = self
            .session
            .query(
                "UPDATE tweets SET content = ?, updated_at = ? WHERE tweet_id = ? IF owner_id = ?",
                (content, to_cql_timestamp(Utc::now()), id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(match self.find_tweet(id).await? {
            Some(tweet) => Guarded::Applied(tweet),
            None => Guarded::NotFound,
        })
    }

    async fn delete_tweet(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Tweet>> {
        let tweet = match self.find_tweet(id).await? {
            Some(tweet) => tweet,
            None => return Ok(Guarded::NotFound),
        };
        let result = self
            .session
            .query(
                "DELETE FROM tweets WHERE tweet_id = ? IF owner_id = ?",
                (id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(Guarded::Applied(tweet))
    }

    async fn toggle_like(&self, target: LikeTarget, user: Uuid) -> StoreResult<ToggleOutcome> {
        let inserted = self
            .session
            .query(
                "INSERT INTO likes (target_kind, target_id, liked_by, created_at) \
                 VALUES (?, ?, ?, ?) IF NOT EXISTS",
                (
                    target.kind.as_str(),
                    target.id,
                    user,
                    to_cql_timestamp(Utc::now()),
                ),
            )
            .await?;
        if applied(&inserted)? {
            return Ok(ToggleOutcome::Added);
        }

        // The like existed when the insert was evaluated. If a concurrent
        // toggle removed it first, the end state is still "absent".
        self.session
            .query(
                "DELETE FROM likes WHERE target_kind = ? AND target_id = ? AND liked_by = ? \
                 IF EXISTS",
                (target.kind.as_str(), target.id, user),
            )
            .await?;
        Ok(ToggleOutcome::Removed)
    }

    async fn has_liked(&self, target: LikeTarget, user: Uuid) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                "SELECT liked_by FROM likes WHERE target_kind = ? AND target_id = ? \
                 AND liked_by = ?",
                (target.kind.as_str(), target.id, user),
            )
            .await?;
        Ok(!rows(result).is_empty())
    }

    async fn count_likes(&self, target: LikeTarget) -> StoreResult<i64> {
        let result = self
            .session
            .query(
                "SELECT COUNT(*) FROM likes WHERE target_kind = ? AND target_id = ?",
                (target.kind.as_str(), target.id),
            )
            .await?;
        Ok(rows(result)
            .first()
            .and_then(|row| column(row, 0))
            .and_then(CqlValue::as_bigint)
            .unwrap_or(0))
    }

    async fn like_counts(&self, kind: LikeKind, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>> {
        let counts = try_join_all(ids.iter().map(|id| async move {
            let count = self.count_likes(LikeTarget { kind, id: *id }).await?;
            Ok::<_, StoreError>((*id, count))
        }))
        .await?;
        Ok(counts.into_iter().filter(|(_, count)| *count > 0).collect())
    }

    async fn likes_by_user(&self, user: Uuid, kind: LikeKind) -> StoreResult<Vec<Like>> {
        let result = self
            .session
            .query(
                "SELECT target_kind, target_id, liked_by, created_at FROM likes \
                 WHERE liked_by = ? ALLOW FILTERING",
                (user,),
            )
            .await?;
        let mut likes = Vec::new();
        for row in rows(result) {
            if let Some(like) = like_from_row(&row)? {
                if like.target.kind == kind {
                    likes.push(like);
                }
            }
        }
        likes.sort_by_key(|like| like.created_at);
        Ok(likes)
    }

    async fn toggle_subscription(
        &self,
        subscriber: Uuid,
        channel: Uuid,
    ) -> StoreResult<ToggleOutcome> {
        let inserted = self
            .session
            .query(
                "INSERT INTO subscriptions (channel_id, subscriber_id, created_at) \
                 VALUES (?, ?, ?) IF NOT EXISTS",
                (channel, subscriber, to_cql_timestamp(Utc::now())),
            )
            .await?;
        if applied(&inserted)? {
            return Ok(ToggleOutcome::Added);
        }
        self.session
            .query(
                "DELETE FROM subscriptions WHERE channel_id = ? AND subscriber_id = ? IF EXISTS",
                (channel, subscriber),
            )
            .await?;
        Ok(ToggleOutcome::Removed)
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                "SELECT subscriber_id FROM subscriptions WHERE channel_id = ? \
                 AND subscriber_id = ?",
                (channel, subscriber),
            )
            .await?;
        Ok(!rows(result).is_empty())
    }

    async fn count_subscribers(&self, channel: Uuid) -> StoreResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?",
            channel,
        )
        .await
    }

    async fn count_subscriptions(&self, subscriber: Uuid) -> StoreResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ? ALLOW FILTERING",
            subscriber,
        )
        .await
    }

    async fn subscribers_of(&self, channel: Uuid) -> StoreResult<Vec<Subscription>> {
        self.select_subscriptions(
            "SELECT channel_id, subscriber_id, created_at FROM subscriptions \
             WHERE channel_id = ?",
            channel,
        )
        .await
    }

    async fn subscriptions_of(&self, subscriber: Uuid) -> StoreResult<Vec<Subscription>> {
        self.select_subscriptions(
            "SELECT channel_id, subscriber_id, created_at FROM subscriptions \
             WHERE subscriber_id = ? ALLOW FILTERING",
            subscriber,
        )
        .await
    }

    async fn insert_playlist(&self, playlist: &Playlist) -> StoreResult<()> {
        self.session
            .query(
                format!(
                    "INSERT INTO playlists ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    PLAYLIST_COLUMNS
                ),
                (
                    playlist.id,
                    playlist.owner,
                    &playlist.name,
                    &playlist.description,
                    playlist.videos.clone(),
                    to_cql_timestamp(playlist.created_at),
                    to_cql_timestamp(playlist.updated_at),
                ),
            )
            .await?;
        Ok(())
    }

    async fn find_playlist(&self, id: Uuid) -> StoreResult<Option<Playlist>> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM playlists WHERE playlist_id = ?", PLAYLIST_COLUMNS),
                (id,),
            )
            .await?;
        rows(result).first().map(playlist_from_row).transpose()
    }

    async fn list_playlists(&self, owner: Uuid) -> StoreResult<Vec<Playlist>> {
        let result = self
            .session
            .query(
                format!(
                    "SELECT {} FROM playlists WHERE owner_id = ? ALLOW FILTERING",
                    PLAYLIST_COLUMNS
                ),
                (owner,),
            )
            .await?;
        let mut playlists = decode_all(result, playlist_from_row)?;
        playlists.sort_by_key(|p| p.created_at);
        Ok(playlists)
    }

    async fn update_playlist(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &PlaylistChanges,
    ) -> StoreResult<Guarded<Playlist>> {
        let result = self
            .session
            .query(
                "UPDATE playlists SET name = ?, description = ?, updated_at = ? \
                 WHERE playlist_id = ? IF owner_id = ?",
                (
                    unset_or(&changes.name),
                    unset_or(&changes.description),
                    to_cql_timestamp(Utc::now()),
                    id,
                    owner,
                ),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(match self.find_playlist(id).await? {
            Some(playlist) => Guarded::Applied(playlist),
            None => Guarded::NotFound,
        })
    }

    async fn delete_playlist(&self, id: Uuid, owner: Uuid) -> StoreResult<Guarded<Playlist>> {
        let playlist = match self.find_playlist(id).await? {
            Some(playlist) => playlist,
            None => return Ok(Guarded::NotFound),
        };
        let result = self
            .session
            .query(
                "DELETE FROM playlists WHERE playlist_id = ? IF owner_id = ?",
                (id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(Guarded::Applied(playlist))
    }

    async fn add_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>> {
        match self.find_playlist(id).await? {
            None => return Ok(Guarded::NotFound),
            Some(playlist) if playlist.owner != owner => return Ok(Guarded::NotOwner),
            Some(playlist) if playlist.videos.contains(&video) => {
                return Ok(Guarded::Applied(false))
            }
            Some(_) => {}
        }
        let result = self
            .session
            .query(
                "UPDATE playlists SET videos = videos + ?, updated_at = ? \
                 WHERE playlist_id = ? IF owner_id = ?",
                (vec![video], to_cql_timestamp(Utc::now()), id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(Guarded::Applied(true))
    }

    async fn remove_playlist_video(
        &self,
        id: Uuid,
        owner: Uuid,
        video: Uuid,
    ) -> StoreResult<Guarded<bool>> {
        match self.find_playlist(id).await? {
            None => return Ok(Guarded::NotFound),
            Some(playlist) if playlist.owner != owner => return Ok(Guarded::NotOwner),
            Some(playlist) if !playlist.videos.contains(&video) => {
                return Ok(Guarded::Applied(false))
            }
            Some(_) => {}
        }
        let result = self
            .session
            .query(
                "UPDATE playlists SET videos = videos - ?, updated_at = ? \
                 WHERE playlist_id = ? IF owner_id = ?",
                (vec![video], to_cql_timestamp(Utc::now()), id, owner),
            )
            .await?;
        if !applied(&result)? {
            return Ok(owner_miss(&result));
        }
        Ok(Guarded::Applied(true))
    }
}
