//! Infrastructure layer for configuration, persistence, and external integrations
//!
//! Provides the SQLite store, the remote xkcd clients, the S3 object store
//! adapter, and the image cache built on top of it.

pub mod bucket_gate;
pub mod comic_repository;
pub mod config;
pub mod content_type;
pub mod database_connection;
pub mod http_client;
pub mod image_cache;
pub mod logging;
pub mod object_store;
pub mod xkcd_client;

// Re-export commonly used items
pub use bucket_gate::BucketGate;
pub use comic_repository::SqliteComicRepository;
pub use config::{AppConfig, ConfigError};
pub use content_type::{ContentTypeDetector, is_valid_image_content_type};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpClient;
pub use image_cache::{CacheError, ImageCache};
pub use logging::{init_logging, init_logging_with_config};
pub use object_store::S3ObjectStore;
pub use xkcd_client::{XkcdClient, XkcdImageClient};
