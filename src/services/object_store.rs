//! Object store for finalised uploads.
//!
//! Finalised files are organised by date and owner under the storage root:
//!
//! ```text
//! storage/
//! ├── md5_index.json                  # dedup index, exempt from stats/sweeps
//! └── 2026/08/01/
//!     ├── anonymous/
//!     │   └── holiday_20260801093012123a4b5c6.jpg
//!     └── user-42/
//!         └── clip_20260801121500456d7e8f9.mp4
//! ```
//!
//! The filename stem is a sanitised copy of the client's original filename;
//! sanitisation is lossy, so a unique time-monotonic suffix guarantees path
//! uniqueness. Stored objects are immutable once written.

use crate::error::Result;
use crate::services::dedup::INDEX_FILE_NAME;
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum length of the sanitised filename stem
const MAX_STEM_LEN: usize = 100;

/// Owner segment used when no owner token was supplied
const ANONYMOUS_OWNER: &str = "anonymous";

/// Filesystem store for finalised objects
#[derive(Debug, Clone)]
pub struct ObjectStore {
    /// Storage root directory
    root: PathBuf,
}

impl ObjectStore {
    /// Create a new object store rooted at `root`, creating it if needed
    pub async fn new(root: &Path) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root).await?;
        }

        info!(root = %root.display(), "Object store initialized");

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Move a finalised file into the canonical layout.
    ///
    /// Returns the path of the stored object relative to the storage root,
    /// using `/` separators.
    pub async fn store(
        &self,
        source: &Path,
        original_filename: &str,
        owner: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let owner_segment = owner.unwrap_or(ANONYMOUS_OWNER);

        let relative_dir = format!(
            "{:04}/{:02}/{:02}/{}",
            now.year(),
            now.month(),
            now.day(),
            owner_segment
        );

        let (stem, extension) = split_filename(original_filename);
        let filename = format!(
            "{}_{}.{}",
            sanitize_stem(stem),
            unique_suffix(),
            extension
        );

        let target_dir = self.root.join(&relative_dir);
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir).await?;
        }

        let target = target_dir.join(&filename);
        move_file(source, &target).await?;

        let relative_path = format!("{}/{}", relative_dir, filename);

        debug!(
            source = %source.display(),
            path = %relative_path,
            "Stored object"
        );

        Ok(relative_path)
    }

    /// Absolute path of a stored object
    pub fn full_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Check whether a stored object exists
    pub fn exists(&self, relative_path: &str) -> bool {
        self.full_path(relative_path).exists()
    }

    /// Delete a stored object, if present
    pub async fn delete(&self, relative_path: &str) -> Result<()> {
        let path = self.full_path(relative_path);

        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(path = %relative_path, "Deleted stored object");
        }

        Ok(())
    }

    /// Recursive file count and byte total, ignoring the dedup index file
    pub async fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        Self::walk(&self.root, &mut stats).await?;
        Ok(stats)
    }

    async fn walk(path: &Path, stats: &mut StorageStats) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let mut entries = fs::read_dir(path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                Box::pin(Self::walk(&entry.path(), stats)).await?;
            } else if metadata.is_file() {
                if entry.file_name() == INDEX_FILE_NAME {
                    continue;
                }
                stats.file_count += 1;
                stats.total_bytes += metadata.len();
            }
        }

        Ok(())
    }
}

/// Aggregate storage statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StorageStats {
    /// Number of stored objects
    pub file_count: u64,
    /// Total bytes across stored objects
    pub total_bytes: u64,
}

/// Split a filename into stem and extension; a file with no extension
/// falls back to `bin`.
fn split_filename(filename: &str) -> (&str, String) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (stem, ext.to_ascii_lowercase())
        }
        _ => (filename, "bin".to_string()),
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_` and cap length
fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect()
}

/// Time-monotonic unique suffix: millisecond timestamp plus random tail.
///
/// 17 timestamp digits + 6 hex characters, 23 characters total.
fn unique_suffix() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let nonce = Uuid::new_v4().as_simple().to_string();
    format!("{}{}", stamp, &nonce[..6])
}

/// Rename across the filesystem, falling back to copy-and-remove when the
/// source lives on a different mount than the storage root.
async fn move_file(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(source, target).await?;
            fs::remove_file(source).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (ObjectStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = ObjectStore::new(&temp.path().join("storage")).await.unwrap();
        (store, temp)
    }

    async fn write_source(temp: &TempDir, data: &[u8]) -> PathBuf {
        let path = temp.path().join("incoming.tmp");
        fs::write(&path, data).await.unwrap();
        path
    }

    #[test]
    fn test_sanitize_stem() {
        assert_eq!(sanitize_stem("holiday photo (1)"), "holiday_photo__1_");
        assert_eq!(sanitize_stem("snake_case-ok.2"), "snake_case-ok_2");

        let long = "x".repeat(150);
        assert_eq!(sanitize_stem(&long).len(), MAX_STEM_LEN);
    }

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("a.JPG"), ("a", "jpg".to_string()));
        assert_eq!(split_filename("archive.tar.gz"), ("archive.tar", "gz".to_string()));
        assert_eq!(split_filename("noext"), ("noext", "bin".to_string()));
    }

    #[test]
    fn test_unique_suffix_length() {
        let suffix = unique_suffix();
        assert!(suffix.len() >= 23, "suffix too short: {}", suffix);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_store_layout() {
        let (store, temp) = create_test_store().await;
        let source = write_source(&temp, b"picture bytes").await;

        let rel = store.store(&source, "my pic.jpg", None).await.unwrap();

        let parts: Vec<&str> = rel.split('/').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].len(), 4); // YYYY
        assert_eq!(parts[1].len(), 2); // MM
        assert_eq!(parts[2].len(), 2); // DD
        assert_eq!(parts[3], "anonymous");
        assert!(parts[4].starts_with("my_pic_"));
        assert!(parts[4].ends_with(".jpg"));

        assert!(store.exists(&rel));
        assert!(!source.exists());
        assert_eq!(fs::read(store.full_path(&rel)).await.unwrap(), b"picture bytes");
    }

    #[tokio::test]
    async fn test_store_owner_segment() {
        let (store, temp) = create_test_store().await;
        let source = write_source(&temp, b"v").await;

        let rel = store.store(&source, "clip.mp4", Some("user-42")).await.unwrap();
        assert!(rel.contains("/user-42/"));
    }

    #[tokio::test]
    async fn test_same_name_does_not_collide() {
        let (store, temp) = create_test_store().await;

        let a = write_source(&temp, b"one").await;
        let rel_a = store.store(&a, "pic.jpg", None).await.unwrap();

        let b = write_source(&temp, b"two").await;
        let rel_b = store.store(&b, "pic.jpg", None).await.unwrap();

        assert_ne!(rel_a, rel_b);
        assert!(store.exists(&rel_a));
        assert!(store.exists(&rel_b));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, temp) = create_test_store().await;
        let source = write_source(&temp, b"z").await;
        let rel = store.store(&source, "pic.jpg", None).await.unwrap();

        store.delete(&rel).await.unwrap();
        assert!(!store.exists(&rel));

        // Deleting again is fine
        store.delete(&rel).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_ignore_index_file() {
        let (store, temp) = create_test_store().await;

        let a = write_source(&temp, b"12345").await;
        store.store(&a, "a.jpg", None).await.unwrap();
        let b = write_source(&temp, b"123").await;
        store.store(&b, "b.jpg", Some("u")).await.unwrap();

        fs::write(store.root().join(INDEX_FILE_NAME), b"{}")
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 8);
    }
}
