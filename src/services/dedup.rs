//! Deduplication index.
//!
//! A persistent single-file map from MD5 digest (hex) to the relative path of
//! the canonical stored object, kept as `md5_index.json` in the storage root.
//! The index is loaded on demand and fully rewritten on each register;
//! writers are serialised behind a mutex.
//!
//! A lookup only returns an entry whose referenced object still exists, so an
//! index that lags reality after a crash (entry without object, object
//! without entry) degrades to a cache miss rather than an error.

use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Filename of the index inside the storage root
pub const INDEX_FILE_NAME: &str = "md5_index.json";

/// Digest-keyed index over the object store
#[derive(Debug)]
pub struct DedupIndex {
    /// Path of the JSON index file
    index_path: PathBuf,
    /// Storage root, for existence re-checks
    storage_root: PathBuf,
    /// Serialises writers
    write_lock: Mutex<()>,
}

impl DedupIndex {
    /// Create an index over the given storage root
    pub fn new(storage_root: &Path) -> Self {
        Self {
            index_path: storage_root.join(INDEX_FILE_NAME),
            storage_root: storage_root.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the full map from disk; a missing file is an empty map
    async fn load(&self) -> Result<BTreeMap<String, String>> {
        let data = match fs::read(&self.index_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data)
            .map_err(|e| AppError::internal(format!("Dedup index is corrupt: {}", e)))
    }

    /// Look up a digest; returns the stored relative path only if the
    /// referenced object still exists.
    pub async fn lookup(&self, md5_hex: &str) -> Result<Option<String>> {
        let map = self.load().await?;

        let Some(relative_path) = map.get(&md5_hex.to_ascii_lowercase()) else {
            return Ok(None);
        };

        if !self.storage_root.join(relative_path).exists() {
            debug!(
                digest = %md5_hex,
                path = %relative_path,
                "Dedup entry is stale, treating as absent"
            );
            return Ok(None);
        }

        Ok(Some(relative_path.clone()))
    }

    /// Upsert a digest -> relative path entry, rewriting the index file
    pub async fn register(&self, md5_hex: &str, relative_path: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.load().await?;
        map.insert(md5_hex.to_ascii_lowercase(), relative_path.to_string());

        let data = serde_json::to_vec_pretty(&map)?;
        fs::write(&self.index_path, data).await?;

        info!(digest = %md5_hex, path = %relative_path, "Registered dedup entry");

        Ok(())
    }
}
