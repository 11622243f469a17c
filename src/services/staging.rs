//! Chunk staging area.
//!
//! Staged chunks for a session live under a private subdirectory of the
//! staging root until the session is finalised, cancelled, or swept:
//!
//! ```text
//! staging/
//! ├── upload_{session_id}/
//! │   ├── chunk_0.bin
//! │   ├── chunk_1.bin
//! │   └── ...
//! └── assemble_{session_id}.tmp   # transient, one finalize call only
//! ```
//!
//! The chunk filename is the sole carrier of the chunk index. Chunks are
//! written to a temporary name and renamed into place, so a staged chunk file
//! is always complete. Staged chunks survive process restart; they are not
//! part of any commit boundary.

use crate::error::{AppError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Copy buffer size for reassembly
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Filesystem staging area for upload chunks
#[derive(Debug, Clone)]
pub struct ChunkStaging {
    /// Staging root directory
    root: PathBuf,
}

impl ChunkStaging {
    /// Create a new staging area rooted at `root`, creating it if needed
    pub async fn new(root: &Path) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root).await?;
        }

        info!(root = %root.display(), "Chunk staging initialized");

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Staging subdirectory for a session
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("upload_{}", session_id))
    }

    /// Path of a staged chunk file
    pub fn chunk_path(&self, session_id: &str, index: u64) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("chunk_{}.bin", index))
    }

    /// Path of the transient reassembly file for one finalize call
    pub fn assembly_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("assemble_{}.tmp", session_id))
    }

    /// Check whether a chunk is already staged
    pub fn has_chunk(&self, session_id: &str, index: u64) -> bool {
        self.chunk_path(session_id, index).exists()
    }

    /// Stage a chunk: write to a temporary name, then rename into place.
    ///
    /// Callers are expected to probe `has_chunk` first; a pre-existing file
    /// at the target path is left untouched.
    pub async fn stage_chunk(&self, session_id: &str, index: u64, data: &[u8]) -> Result<()> {
        let session_dir = self.session_dir(session_id);
        if !session_dir.exists() {
            fs::create_dir_all(&session_dir).await?;
        }

        let target = self.chunk_path(session_id, index);
        if target.exists() {
            return Ok(());
        }

        let part = target.with_extension("bin.part");
        let mut file = fs::File::create(&part).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&part, &target).await?;

        debug!(
            session_id = %session_id,
            chunk_index = index,
            size = data.len(),
            "Staged chunk"
        );

        Ok(())
    }

    /// Enumerate the indices of staged chunks by parsing filenames.
    ///
    /// A missing staging directory yields an empty set.
    pub async fn enumerate_chunks(&self, session_id: &str) -> Result<HashSet<u64>> {
        let session_dir = self.session_dir(session_id);
        let mut indices = HashSet::new();

        if !session_dir.exists() {
            return Ok(indices);
        }

        let mut entries = fs::read_dir(&session_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(index) = name
                .strip_prefix("chunk_")
                .and_then(|rest| rest.strip_suffix(".bin"))
                .and_then(|num| num.parse::<u64>().ok())
            {
                indices.insert(index);
            }
        }

        Ok(indices)
    }

    /// Reassemble chunks `0..total_chunks` in order into `output`.
    ///
    /// Streams each chunk in fixed-size read buffers. Fails with `DataLoss`
    /// if any chunk is missing and leaves no partial output behind.
    pub async fn reassemble(
        &self,
        session_id: &str,
        total_chunks: u64,
        output: &Path,
    ) -> Result<()> {
        let result = self.reassemble_inner(session_id, total_chunks, output).await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %output.display(),
                        error = %e,
                        "Failed to remove partial reassembly output"
                    );
                }
            }
        }

        result
    }

    async fn reassemble_inner(
        &self,
        session_id: &str,
        total_chunks: u64,
        output: &Path,
    ) -> Result<()> {
        let mut out = fs::File::create(output).await?;
        let mut buf = vec![0u8; COPY_BUF_SIZE];

        for index in 0..total_chunks {
            let chunk_path = self.chunk_path(session_id, index);

            let mut chunk = match fs::File::open(&chunk_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(AppError::data_loss(format!(
                        "chunk {} of session {} is missing from staging",
                        index, session_id
                    )));
                }
                Err(e) => return Err(e.into()),
            };

            loop {
                let n = chunk.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
            }
        }

        out.flush().await?;

        debug!(
            session_id = %session_id,
            total_chunks = total_chunks,
            output = %output.display(),
            "Reassembled chunks"
        );

        Ok(())
    }

    /// Delete the staging subdirectory for a session, if present
    pub async fn purge(&self, session_id: &str) -> Result<()> {
        let session_dir = self.session_dir(session_id);

        if session_dir.exists() {
            fs::remove_dir_all(&session_dir).await?;
            debug!(session_id = %session_id, "Purged staging directory");
        }

        Ok(())
    }

    /// Delete staging subdirectories whose mtime is older than `max_age_secs`.
    ///
    /// Returns the number of directories deleted.
    pub async fn purge_expired(&self, max_age_secs: u64) -> Result<usize> {
        let mut purged = 0;
        let now = std::time::SystemTime::now();
        let max_age = std::time::Duration::from_secs(max_age_secs);

        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if !path.is_dir() {
                continue;
            }

            // Directory age based on modification time
            if let Ok(metadata) = fs::metadata(&path).await {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > max_age {
                            if let Err(e) = fs::remove_dir_all(&path).await {
                                warn!(
                                    path = %path.display(),
                                    error = %e,
                                    "Failed to purge expired staging directory"
                                );
                            } else {
                                info!(path = %path.display(), "Purged expired staging directory");
                                purged += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(purged)
    }
}
