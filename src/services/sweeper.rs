//! Expired-object sweeping.
//!
//! The object sweeper walks the storage root and deletes files whose
//! modification time is past the retention horizon, then prunes directories
//! left empty. The dedup index file is exempt; dedup entries pointing at a
//! swept object are invalidated implicitly by the lookup-time existence
//! check.
//!
//! The staging counterpart lives on `ChunkStaging::purge_expired`.

use crate::error::Result;
use crate::services::dedup::INDEX_FILE_NAME;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

/// Outcome of one expired-object sweep
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    /// Files examined
    pub scanned: u64,
    /// Files deleted
    pub deleted: u64,
    /// Files that could not be examined or deleted
    pub errors: u64,
    /// Bytes reclaimed by deletions
    pub freed_bytes: u64,
}

/// Delete stored objects older than `retention_days` and prune empty
/// directories.
pub async fn purge_expired_objects(storage_root: &Path, retention_days: u64) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let max_age = Duration::from_secs(retention_days * 24 * 60 * 60);
    let now = SystemTime::now();

    sweep_dir(storage_root, storage_root, now, max_age, &mut report).await?;
    prune_empty_dirs(storage_root, storage_root).await?;

    Ok(report)
}

async fn sweep_dir(
    root: &Path,
    dir: &Path,
    now: SystemTime,
    max_age: Duration,
    report: &mut SweepReport,
) -> Result<()> {
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat during sweep");
                report.errors += 1;
                continue;
            }
        };

        if metadata.is_dir() {
            Box::pin(sweep_dir(root, &path, now, max_age, report)).await?;
            continue;
        }

        if !metadata.is_file() {
            continue;
        }

        // The dedup index sits at the root and is never swept
        if dir == root && entry.file_name() == INDEX_FILE_NAME {
            continue;
        }

        report.scanned += 1;

        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);

        if !expired {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Swept expired object");
                report.deleted += 1;
                report.freed_bytes += metadata.len();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to sweep expired object");
                report.errors += 1;
            }
        }
    }

    Ok(())
}

/// Remove directories that became empty, bottom-up. The root itself stays.
async fn prune_empty_dirs(root: &Path, dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_dir() {
            Box::pin(prune_empty_dirs(root, &path)).await?;

            let mut contents = fs::read_dir(&path).await?;
            if contents.next_entry().await?.is_none() {
                // Empty after pruning children; a racing store() recreates
                // its directory, so a failure here is harmless
                let _ = fs::remove_dir(&path).await;
            }
        }
    }

    Ok(())
}
