use log::{debug, info};
use scylla::{Session, SessionBuilder};

use crate::config::ScyllaConfig;
use crate::store::StoreResult;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        user_id uuid PRIMARY KEY,
        username text,
        email text,
        fullname text,
        avatar text,
        cover_image text,
        watch_history list<uuid>,
        password_hash text,
        refresh_token text,
        created_at timestamp,
        updated_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS usernames (username text PRIMARY KEY, user_id uuid)",
    "CREATE TABLE IF NOT EXISTS emails (email text PRIMARY KEY, user_id uuid)",
    "CREATE TABLE IF NOT EXISTS videos (
        video_id uuid PRIMARY KEY,
        owner_id uuid,
        title text,
        description text,
        video_file text,
        thumbnail text,
        duration double,
        is_published boolean,
        created_at timestamp,
        updated_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS video_views (video_id uuid PRIMARY KEY, views counter)",
    "CREATE TABLE IF NOT EXISTS comments (
        comment_id uuid PRIMARY KEY,
        video_id uuid,
        owner_id uuid,
        content text,
        created_at timestamp,
        updated_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS tweets (
        tweet_id uuid PRIMARY KEY,
        owner_id uuid,
        content text,
        created_at timestamp,
        updated_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS likes (
        target_kind text,
        target_id uuid,
        liked_by uuid,
        created_at timestamp,
        PRIMARY KEY ((target_kind, target_id), liked_by)
    )",
    "CREATE TABLE IF NOT EXISTS subscriptions (
        channel_id uuid,
        subscriber_id uuid,
        created_at timestamp,
        PRIMARY KEY ((channel_id), subscriber_id)
    )",
    "CREATE TABLE IF NOT EXISTS playlists (
        playlist_id uuid PRIMARY KEY,
        owner_id uuid,
        name text,
        description text,
        videos list<uuid>,
        created_at timestamp,
        updated_at timestamp
    )",
];

pub async fn create_session(config: &ScyllaConfig) -> StoreResult<Session> {
    let session = SessionBuilder::new()
        .known_nodes(config.nodes())
        .build()
        .await?;

    migrate(&session, config).await?;
    session.use_keyspace(&config.keyspace, false).await?;

    Ok(session)
}

/// Creates the keyspace and tables if they are missing.
async fn migrate(session: &Session, config: &ScyllaConfig) -> StoreResult<()> {
    let keyspace = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        config.keyspace, config.replication_factor
    );
    session.query(keyspace, &[]).await?;

    for statement in TABLES {
        let qualified = statement.replacen(
            "IF NOT EXISTS ",
            &format!("IF NOT EXISTS {}.", config.keyspace),
            1,
        );
        debug!("{}", qualified.lines().next().unwrap_or_default());
        session.query(qualified, &[]).await?;
    }

    info!("Schema ready in keyspace {}", config.keyspace);
    Ok(())
}
