use bcrypt::hash;
use chrono::{Duration, Utc};
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::faker::name::en::Name;
use fake::Fake;
use std::error::Error;
use uuid::Uuid;

use vidtube::config::Config;
use vidtube::db;
use vidtube::models::{normalize_handle, LikeTarget, Tweet, User, Video};
use vidtube::store::{ScyllaStore, Store};

const NUM_USERS: usize = 50;
const VIDEOS_PER_USER: usize = 10;
const TWEETS_PER_USER: usize = 20;
const SEED_PASSWORD: &str = "password123";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("Starting data seeding...");

    let config = Config::from_env()?;
    let session = db::create_session(&config.scylla()).await?;
    let store = ScyllaStore::new(session);

    let users = seed_users(&store, NUM_USERS, config.bcrypt_cost).await?;
    let videos = seed_videos(&store, &users, VIDEOS_PER_USER).await?;
    seed_tweets(&store, &users, TWEETS_PER_USER).await?;
    seed_engagement(&store, &users, &videos).await?;

    println!("Seeding completed!");
    Ok(())
}

async fn seed_users(
    store: &dyn Store,
    count: usize,
    cost: u32,
) -> Result<Vec<Uuid>, Box<dyn Error>> {
    println!("Creating {} users...", count);
    // Every seeded account shares one password, so hash it once.
    let password_hash = hash(SEED_PASSWORD, cost)?;
    let mut users = Vec::new();

    while users.len() < count {
        let username = normalize_handle(&Username().fake::<String>());
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_handle(&SafeEmail().fake::<String>()),
            fullname: Name().fake(),
            avatar: format!("https://picsum.photos/seed/{}/200", username),
            cover_image: None,
            watch_history: Vec::new(),
            password_hash: password_hash.clone(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
            username,
        };

        // Fake usernames collide now and then; skip those.
        if !store.create_user(&user).await? {
            continue;
        }
        users.push(user.id);
        println!(
            "Created user {}/{}: {} ({})",
            users.len(),
            count,
            user.username,
            user.id
        );
    }

    Ok(users)
}

async fn seed_videos(
    store: &dyn Store,
    users: &[Uuid],
    per_user: usize,
) -> Result<Vec<Uuid>, Box<dyn Error>> {
    println!("Creating {} videos per user...", per_user);
    let mut videos = Vec::new();

    for &owner in users {
        for i in 0..per_user {
            let at = Utc::now() - Duration::hours((1..720).fake::<i64>());
            let video = Video {
                id: Uuid::new_v4(),
                owner,
                title: Sentence(2..6).fake(),
                description: Paragraph(1..3).fake(),
                video_file: format!("https://example.com/videos/{}.mp4", Uuid::new_v4()),
                thumbnail: format!("https://picsum.photos/seed/{}/640/360", Uuid::new_v4()),
                duration: (30.0..1800.0).fake(),
                views: 0,
                // Leave a few drafts per channel.
                is_published: i % 5 != 0,
                created_at: at,
                updated_at: at,
            };
            store.insert_video(&video).await?;
            videos.push(video.id);
        }
    }

    println!("Created {} videos", videos.len());
    Ok(videos)
}

async fn seed_tweets(
    store: &dyn Store,
    users: &[Uuid],
    per_user: usize,
) -> Result<(), Box<dyn Error>> {
    println!("Creating {} tweets per user...", per_user);
    let total = users.len() * per_user;
    let mut current = 0;

    for &owner in users {
        for _ in 0..per_user {
            let now = Utc::now();
            let tweet = Tweet {
                id: Uuid::new_v4(),
                owner,
                content: Sentence(3..10).fake(),
                created_at: now,
                updated_at: now,
            };
            store.insert_tweet(&tweet).await?;

            current += 1;
            if current % 100 == 0 {
                println!("Created {}/{} tweets", current, total);
            }
        }
    }

    Ok(())
}

/// Random subscriptions, likes and views so the read views have data.
async fn seed_engagement(
    store: &dyn Store,
    users: &[Uuid],
    videos: &[Uuid],
) -> Result<(), Box<dyn Error>> {
    println!("Creating subscriptions, likes and views...");
    if users.is_empty() || videos.is_empty() {
        return Ok(());
    }

    for &user in users {
        for _ in 0..5 {
            let channel = users[(0..users.len()).fake::<usize>()];
            if channel != user && !store.is_subscribed(user, channel).await? {
                store.toggle_subscription(user, channel).await?;
            }
        }
        for _ in 0..10 {
            let video = videos[(0..videos.len()).fake::<usize>()];
            store.record_view(video).await?;
            store.push_watch_history(user, video).await?;
            if !store.has_liked(LikeTarget::video(video), user).await? {
                store.toggle_like(LikeTarget::video(video), user).await?;
            }
        }
    }

    Ok(())
}
