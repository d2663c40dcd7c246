pub mod actors;
pub mod cache;
pub mod config;
pub mod domain;
pub mod http;
pub mod ingest;
pub mod messaging;
pub mod metrics;
pub mod restore;
pub mod store;
pub mod utils;
