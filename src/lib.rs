pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::storage::{BlobStore, LocalBlobStore};

/// Handles shared by every operation, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    /// Open the database, run migrations and set up local blob storage
    pub async fn init(config: Config) -> Result<Self> {
        let db = Database::new(&config.database).await?;
        db.run_migrations().await?;
        tracing::info!("Database initialized");

        let blobs = Arc::new(LocalBlobStore::new(&config.storage));

        Ok(Self {
            db,
            config: Arc::new(config),
            blobs,
        })
    }

    /// Same state over a different blob store
    pub fn with_blob_store(self, blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs, ..self }
    }
}
