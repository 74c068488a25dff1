//! Read pipelines.
//!
//! Each view is built in two steps: a handful of store reads (by key, by
//! owner, by id list), then pure shaping stages in process: filter, join the
//! owner's public profile, attach like counts, sort, paginate. Nothing here
//! writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{Comment, LikeKind, LikeTarget, Playlist, Tweet, User, Video};
use crate::store::{CommentFilter, Store, StoreResult, VideoFilter};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

/// A clamped page request. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p as usize,
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l <= 0 => DEFAULT_LIMIT,
            Some(l) => (l as usize).min(MAX_LIMIT),
            None => DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_items: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub page_size: usize,
}

pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> (Vec<T>, PageMeta) {
    let total_items = items.len();
    let meta = PageMeta {
        total_items,
        current_page: request.page,
        total_pages: total_items.div_ceil(request.limit),
        page_size: request.limit,
    };
    let rows = items
        .into_iter()
        .skip(request.offset())
        .take(request.limit)
        .collect();
    (rows, meta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Views,
    Duration,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for VideoSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl VideoSort {
    /// Unknown fields fall back to newest first; an unknown direction on a
    /// known field means descending.
    pub fn parse(sort_by: Option<&str>, sort_type: Option<&str>) -> Self {
        let field = match sort_by.map(str::trim) {
            Some("createdAt") => SortField::CreatedAt,
            Some("views") => SortField::Views,
            Some("duration") => SortField::Duration,
            Some("title") => SortField::Title,
            _ => return Self::default(),
        };
        let direction = match sort_type.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        };
        Self { field, direction }
    }

    fn compare(&self, a: &Video, b: &Video) -> Ordering {
        let ord = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Views => a.views.cmp(&b.views),
            SortField::Duration => a
                .duration
                .partial_cmp(&b.duration)
                .unwrap_or(Ordering::Equal),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        let ord = match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        ord.then_with(|| b.created_at.cmp(&a.created_at))
    }
}

/// The public fields of a user, embedded wherever a row references one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub avatar: String,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCard {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video_file: String,
    pub thumbnail: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: OwnerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoCard {
    fn new(video: Video, owner: OwnerSummary) -> Self {
        Self {
            id: video.id,
            title: video.title,
            description: video.description,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            duration: video.duration,
            views: video.views,
            is_published: video.is_published,
            owner,
            likes_count: None,
            is_liked: None,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}

/// Looks up the public profile of every distinct id.
async fn owners(
    store: &dyn Store,
    ids: impl IntoIterator<Item = Uuid>,
) -> StoreResult<HashMap<Uuid, OwnerSummary>> {
    let distinct: Vec<Uuid> = ids
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if distinct.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(store
        .find_users(&distinct)
        .await?
        .iter()
        .map(|u| (u.id, OwnerSummary::from(u)))
        .collect())
}

/// Inner join of videos with their owners, preserving input order.
async fn video_cards(store: &dyn Store, videos: Vec<Video>) -> StoreResult<Vec<VideoCard>> {
    let owners = owners(store, videos.iter().map(|v| v.owner)).await?;
    Ok(videos
        .into_iter()
        .filter_map(|v| {
            let owner = owners.get(&v.owner)?.clone();
            Some(VideoCard::new(v, owner))
        })
        .collect())
}

/// Fetches `ids` and returns them in the same order, skipping ids that no
/// longer resolve.
async fn videos_in_order(store: &dyn Store, ids: &[Uuid]) -> StoreResult<Vec<Video>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_id: HashMap<Uuid, Video> = store
        .find_videos(ids)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

#[derive(Debug, Clone, Default)]
pub struct FeedParams {
    pub page: PageRequest,
    pub search: Option<String>,
    pub owner: Option<Uuid>,
    pub sort: VideoSort,
}

#[derive(Debug, Serialize)]
pub struct VideoFeed {
    pub videos: Vec<VideoCard>,
    pub metadata: PageMeta,
}

/// Published videos, optionally narrowed to one owner and a search term,
/// joined with their owners, sorted and paginated.
pub async fn video_feed(store: &dyn Store, params: &FeedParams) -> StoreResult<VideoFeed> {
    let mut videos = store
        .list_videos(VideoFilter {
            owner: params.owner,
            published_only: true,
        })
        .await?;

    if let Some(term) = params.search.as_deref().map(str::to_lowercase) {
        videos.retain(|v| {
            v.title.to_lowercase().contains(&term) || v.description.to_lowercase().contains(&term)
        });
    }
    videos.sort_by(|a, b| params.sort.compare(a, b));

    let cards = video_cards(store, videos).await?;
    let (videos, metadata) = paginate(cards, params.page);
    Ok(VideoFeed { videos, metadata })
}

/// Whether `viewer` may see the video at all: published, or their own.
pub async fn video_visible(store: &dyn Store, id: Uuid, viewer: Uuid) -> StoreResult<bool> {
    Ok(matches!(
        store.find_video(id).await?,
        Some(v) if v.is_published || v.owner == viewer
    ))
}

/// A single video with its like count and whether `viewer` liked it.
/// Unpublished videos are only visible to their owner.
pub async fn video_detail(
    store: &dyn Store,
    id: Uuid,
    viewer: Uuid,
) -> StoreResult<Option<VideoCard>> {
    let video = match store.find_video(id).await? {
        Some(v) if v.is_published || v.owner == viewer => v,
        _ => return Ok(None),
    };
    let owner = match store.find_user(video.owner).await? {
        Some(user) => OwnerSummary::from(&user),
        None => return Ok(None),
    };
    let target = LikeTarget::video(id);
    let (likes, liked) = futures::try_join!(
        store.count_likes(target),
        store.has_liked(target, viewer)
    )?;

    let mut card = VideoCard::new(video, owner);
    card.likes_count = Some(likes);
    card.is_liked = Some(liked);
    Ok(Some(card))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub content: String,
    pub video: Uuid,
    pub owner: OwnerSummary,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentsPage {
    pub comments: Vec<CommentView>,
    pub metadata: PageMeta,
}

/// Comments on a video, newest first, each with its author and like count.
pub async fn video_comments(
    store: &dyn Store,
    video: Uuid,
    page: PageRequest,
) -> StoreResult<CommentsPage> {
    let mut comments = store.list_comments(CommentFilter::Video(video)).await?;
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let owners = owners(store, comments.iter().map(|c| c.owner)).await?;
    comments.retain(|c| owners.contains_key(&c.owner));
    let (comments, metadata) = paginate(comments, page);

    // Only the visible page needs counts.
    let ids: Vec<Uuid> = comments.iter().map(|c| c.id).collect();
    let likes = store.like_counts(LikeKind::Comment, &ids).await?;

    let comments = comments
        .into_iter()
        .filter_map(|c: Comment| {
            let owner = owners.get(&c.owner)?.clone();
            Some(CommentView {
                likes_count: likes.get(&c.id).copied().unwrap_or(0),
                id: c.id,
                content: c.content,
                video: c.video,
                owner,
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
        })
        .collect();
    Ok(CommentsPage { comments, metadata })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetView {
    pub id: Uuid,
    pub content: String,
    pub owner: OwnerSummary,
    pub likes_count: i64,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's tweets, newest first. `None` when the user does not exist.
pub async fn user_tweets(
    store: &dyn Store,
    user: Uuid,
    viewer: Uuid,
) -> StoreResult<Option<Vec<TweetView>>> {
    let owner = match store.find_user(user).await? {
        Some(u) => OwnerSummary::from(&u),
        None => return Ok(None),
    };
    let mut tweets = store.list_tweets(user).await?;
    tweets.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let ids: Vec<Uuid> = tweets.iter().map(|t| t.id).collect();
    let likes = store.like_counts(LikeKind::Tweet, &ids).await?;
    let liked: HashSet<Uuid> = store
        .likes_by_user(viewer, LikeKind::Tweet)
        .await?
        .into_iter()
        .map(|l| l.target.id)
        .collect();

    Ok(Some(
        tweets
            .into_iter()
            .map(|t: Tweet| TweetView {
                likes_count: likes.get(&t.id).copied().unwrap_or(0),
                is_liked: liked.contains(&t.id),
                id: t.id,
                content: t.content,
                owner: owner.clone(),
                created_at: t.created_at,
                updated_at: t.updated_at,
            })
            .collect(),
    ))
}

/// Videos the user liked, most recently liked first. Unpublished videos are
/// only kept when the user owns them.
pub async fn liked_videos(store: &dyn Store, user: Uuid) -> StoreResult<Vec<VideoCard>> {
    let mut likes = store.likes_by_user(user, LikeKind::Video).await?;
    likes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let ids: Vec<Uuid> = likes.iter().map(|l| l.target.id).collect();

    let mut videos = videos_in_order(store, &ids).await?;
    videos.retain(|v| v.is_published || v.owner == user);
    video_cards(store, videos).await
}

/// The user's watch history, most recent first. Videos unpublished since
/// they were watched drop out unless the user owns them.
pub async fn watch_history(store: &dyn Store, user: &User) -> StoreResult<Vec<VideoCard>> {
    let ids: Vec<Uuid> = user.watch_history.iter().rev().copied().collect();
    let mut videos = videos_in_order(store, &ids).await?;
    videos.retain(|v| v.is_published || v.owner == user.id);
    video_cards(store, videos).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: i64,
    pub channels_subscribed_to_count: i64,
    pub is_subscribed: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn channel_profile(
    store: &dyn Store,
    username: &str,
    viewer: Uuid,
) -> StoreResult<Option<ChannelProfile>> {
    let channel = match store.find_user_by_username(username).await? {
        Some(user) => user,
        None => return Ok(None),
    };
    let (subscribers, subscribed_to, is_subscribed) = futures::try_join!(
        store.count_subscribers(channel.id),
        store.count_subscriptions(channel.id),
        store.is_subscribed(viewer, channel.id)
    )?;

    Ok(Some(ChannelProfile {
        id: channel.id,
        username: channel.username,
        fullname: channel.fullname,
        email: channel.email,
        avatar: channel.avatar,
        cover_image: channel.cover_image,
        subscribers_count: subscribers,
        channels_subscribed_to_count: subscribed_to,
        is_subscribed,
        created_at: channel.created_at,
    }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberView {
    #[serde(flatten)]
    pub subscriber: OwnerSummary,
    /// Whether the channel subscribes back.
    pub subscribed_to_subscriber: bool,
    pub subscribers_count: i64,
    pub subscribed_at: DateTime<Utc>,
}

/// Everyone subscribed to `channel`, newest first.
pub async fn channel_subscribers(
    store: &dyn Store,
    channel: Uuid,
) -> StoreResult<Vec<SubscriberView>> {
    let mut subs = store.subscribers_of(channel).await?;
    subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let profiles = owners(store, subs.iter().map(|s| s.subscriber)).await?;
    let back: HashSet<Uuid> = store
        .subscriptions_of(channel)
        .await?
        .into_iter()
        .map(|s| s.channel)
        .collect();

    let mut views = Vec::with_capacity(subs.len());
    for sub in subs {
        let Some(profile) = profiles.get(&sub.subscriber) else {
            continue;
        };
        views.push(SubscriberView {
            subscriber: profile.clone(),
            subscribed_to_subscriber: back.contains(&sub.subscriber),
            subscribers_count: store.count_subscribers(sub.subscriber).await?,
            subscribed_at: sub.created_at,
        });
    }
    Ok(views)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannel {
    #[serde(flatten)]
    pub channel: OwnerSummary,
    pub latest_video: Option<Video>,
    pub subscribed_at: DateTime<Utc>,
}

/// Channels `subscriber` follows, newest subscription first, each with its
/// latest published video.
pub async fn subscribed_channels(
    store: &dyn Store,
    subscriber: Uuid,
) -> StoreResult<Vec<SubscribedChannel>> {
    let mut subs = store.subscriptions_of(subscriber).await?;
    subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let profiles = owners(store, subs.iter().map(|s| s.channel)).await?;

    let mut channels = Vec::with_capacity(subs.len());
    for sub in subs {
        let Some(profile) = profiles.get(&sub.channel) else {
            continue;
        };
        let latest_video = store
            .list_videos(VideoFilter {
                owner: Some(sub.channel),
                published_only: true,
            })
            .await?
            .into_iter()
            .max_by_key(|v| v.created_at);
        channels.push(SubscribedChannel {
            channel: profile.clone(),
            latest_video,
            subscribed_at: sub.created_at,
        });
    }
    Ok(channels)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub total_videos: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Playlist> for PlaylistSummary {
    fn from(p: Playlist) -> Self {
        Self {
            total_videos: p.videos.len(),
            id: p.id,
            name: p.name,
            description: p.description,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub async fn user_playlists(store: &dyn Store, owner: Uuid) -> StoreResult<Vec<PlaylistSummary>> {
    let mut playlists = store.list_playlists(owner).await?;
    playlists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(playlists.into_iter().map(PlaylistSummary::from).collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: OwnerSummary,
    pub videos: Vec<VideoCard>,
    pub total_videos: usize,
    pub total_views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A playlist with its published videos in playlist order.
pub async fn playlist_detail(store: &dyn Store, id: Uuid) -> StoreResult<Option<PlaylistView>> {
    let playlist = match store.find_playlist(id).await? {
        Some(p) => p,
        None => return Ok(None),
    };
    let owner = match store.find_user(playlist.owner).await? {
        Some(user) => OwnerSummary::from(&user),
        None => return Ok(None),
    };
    let mut videos = videos_in_order(store, &playlist.videos).await?;
    videos.retain(|v| v.is_published);
    let videos = video_cards(store, videos).await?;

    Ok(Some(PlaylistView {
        id: playlist.id,
        name: playlist.name,
        description: playlist.description,
        owner,
        total_videos: videos.len(),
        total_views: videos.iter().map(|v| v.views).sum(),
        videos,
        created_at: playlist.created_at,
        updated_at: playlist.updated_at,
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_videos: i64,
    pub total_video_views: i64,
    pub total_subscribers: i64,
    pub total_video_likes: i64,
    pub total_tweet_likes: i64,
    pub total_comment_likes: i64,
}

async fn likes_received(store: &dyn Store, kind: LikeKind, ids: &[Uuid]) -> StoreResult<i64> {
    if ids.is_empty() {
        return Ok(0);
    }
    Ok(store.like_counts(kind, ids).await?.values().sum())
}

/// Totals for the channel's own content. Every figure is 0 when there is
/// nothing to count.
pub async fn channel_stats(store: &dyn Store, channel: Uuid) -> StoreResult<ChannelStats> {
    let (videos, tweets, comments, subscribers) = futures::try_join!(
        store.list_videos(VideoFilter {
            owner: Some(channel),
            published_only: false,
        }),
        store.list_tweets(channel),
        store.list_comments(CommentFilter::Owner(channel)),
        store.count_subscribers(channel)
    )?;

    let video_ids: Vec<Uuid> = videos.iter().map(|v| v.id).collect();
    let tweet_ids: Vec<Uuid> = tweets.iter().map(|t| t.id).collect();
    // Comments on deleted videos are unreachable; their likes do not count.
    let mut commented: Vec<Uuid> = comments.iter().map(|c| c.video).collect();
    commented.sort();
    commented.dedup();
    let live: HashSet<Uuid> = videos_in_order(store, &commented)
        .await?
        .into_iter()
        .map(|v| v.id)
        .collect();
    let comment_ids: Vec<Uuid> = comments
        .iter()
        .filter(|c| live.contains(&c.video))
        .map(|c| c.id)
        .collect();
    let (video_likes, tweet_likes, comment_likes) = futures::try_join!(
        likes_received(store, LikeKind::Video, &video_ids),
        likes_received(store, LikeKind::Tweet, &tweet_ids),
        likes_received(store, LikeKind::Comment, &comment_ids)
    )?;

    Ok(ChannelStats {
        total_videos: videos.len() as i64,
        total_video_views: videos.iter().map(|v| v.views).sum(),
        total_subscribers: subscribers,
        total_video_likes: video_likes,
        total_tweet_likes: tweet_likes,
        total_comment_likes: comment_likes,
    })
}

/// All of the channel's videos, published or not, newest first with like
/// counts.
pub async fn dashboard_videos(store: &dyn Store, owner: &User) -> StoreResult<Vec<VideoCard>> {
    let mut videos = store
        .list_videos(VideoFilter {
            owner: Some(owner.id),
            published_only: false,
        })
        .await?;
    videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let ids: Vec<Uuid> = videos.iter().map(|v| v.id).collect();
    let likes = if ids.is_empty() {
        HashMap::new()
    } else {
        store.like_counts(LikeKind::Video, &ids).await?
    };
    let summary = OwnerSummary::from(owner);

    Ok(videos
        .into_iter()
        .map(|v| {
            let count = likes.get(&v.id).copied().unwrap_or(0);
            let mut card = VideoCard::new(v, summary.clone());
            card.likes_count = Some(count);
            card
        })
        .collect())
}
