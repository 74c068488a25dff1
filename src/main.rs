use actix_web::{middleware, web, App, HttpServer};
use env_logger::{Builder, Env};
use log::{error, info};
use std::sync::Arc;

use vidtube::auth::Identity;
use vidtube::config::{Config, MediaBackend, StoreBackend};
use vidtube::error::route_not_found;
use vidtube::media::{CloudinaryStore, LocalMediaStore, MediaStore};
use vidtube::store::{MemoryStore, ScyllaStore, Store};
use vidtube::{db, routes};

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    info!("Starting vidtube backend...");
    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Scylla => {
            let session = db::create_session(&config.scylla())
                .await
                .map_err(|e| startup_error("Failed to create database session", e))?;
            info!("Connected to ScyllaDB");
            Arc::new(ScyllaStore::new(session))
        }
        StoreBackend::Memory => {
            info!("Using the in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let media: Arc<dyn MediaStore> = match config.media_backend {
        MediaBackend::Local => Arc::new(
            LocalMediaStore::new(&config.media_dir, &config.media_base_url)
                .await
                .map_err(|e| startup_error("Failed to prepare media directory", e))?,
        ),
        MediaBackend::Cloudinary => Arc::new(CloudinaryStore::new(
            config
                .cloudinary()
                .map_err(|e| startup_error("Invalid Cloudinary configuration", e))?,
        )),
    };

    let identity = web::Data::new(Identity::from_config(&config));
    let store = web::Data::from(store);
    let media = web::Data::from(media);
    let max_upload_bytes = config.max_upload_bytes;
    let workers = config.workers.unwrap_or_else(num_cpus::get);

    info!(
        "Listening on {}:{} with {} workers",
        config.host, config.port, workers
    );
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(store.clone())
            .app_data(media.clone())
            .app_data(identity.clone())
            .configure(|cfg| routes::configure(cfg, max_upload_bytes))
            .default_service(web::to(route_not_found))
    })
    .workers(workers)
    .bind(config.bind_addr())?
    .run()
    .await?;

    info!("Server stopped; database session released");
    Ok(())
}
