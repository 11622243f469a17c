//! Application state management.
//!
//! This module defines the shared application state that is accessible
//! from all request handlers via Axum's State extractor. All services are
//! constructed here with explicit roots, so tests can stand up a complete
//! state over temporary directories.
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn handler(State(state): State<AppState>) -> impl IntoResponse {
//!     let session = state.manager.status(&id).await?;
//!     // ...
//! }
//! ```

use crate::config::Config;
use crate::error::Result;
use crate::services::{ChunkStaging, DedupIndex, ObjectStore, SessionDb, UploadManager};
use std::sync::Arc;

/// Shared application state
///
/// This struct holds all shared resources that handlers need access to.
/// It's wrapped in `Arc` and cloned into each request handler.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Chunk staging area (shared with the staging sweeper)
    pub staging: Arc<ChunkStaging>,

    /// Object store (shared with the object sweeper)
    pub store: Arc<ObjectStore>,

    /// Upload session manager
    pub manager: Arc<UploadManager>,
}

impl AppState {
    /// Create a new application state
    ///
    /// # Arguments
    /// * `config` - Application configuration
    ///
    /// # Errors
    /// Returns error if services cannot be initialized
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let db = Arc::new(SessionDb::new(&config.storage.session_db_root)?);
        let staging = Arc::new(ChunkStaging::new(&config.storage.staging_root).await?);
        let store = Arc::new(ObjectStore::new(&config.storage.storage_root).await?);
        let dedup = Arc::new(DedupIndex::new(&config.storage.storage_root));

        let manager = Arc::new(UploadManager::new(
            Arc::clone(&config),
            db,
            Arc::clone(&staging),
            Arc::clone(&store),
            dedup,
        ));

        Ok(Self {
            config,
            staging,
            store,
            manager,
        })
    }

    /// Get the chunk size for chunked uploads
    pub fn chunk_size(&self) -> u64 {
        self.config.upload.chunk_size
    }

    /// Get the staging expiry horizon in seconds
    pub fn chunk_timeout(&self) -> u64 {
        self.config.retention.chunk_timeout_seconds
    }

    /// Get the stored-object retention horizon in days
    pub fn retention_days(&self) -> u64 {
        self.config.retention.retention_days
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("staging", &"<ChunkStaging>")
            .field("store", &"<ObjectStore>")
            .field("manager", &"<UploadManager>")
            .finish()
    }
}
