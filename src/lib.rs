pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod store;
