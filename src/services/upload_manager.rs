//! Upload session manager.
//!
//! Orchestrates the five operations of the upload protocol: initiate,
//! receive chunk, finalize, status, cancel. Owns all state transitions on a
//! session; every other service is a constructor dependency.
//!
//! # Concurrency
//!
//! State transitions are serialised per session through a lock registry
//! keyed by session id: at most one in-flight finalize or cancel per
//! session, and the chunk-existence probe and counter increment of
//! concurrent chunk receipts share one critical section, so a replayed
//! chunk can never double-count. Requests for different sessions never
//! contend.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{UploadSession, UploadState};
use crate::services::validation::{self, ContentCheck};
use crate::services::{digest, ChunkStaging, DedupIndex, ObjectStore, SessionDb};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of an initiate call
#[derive(Debug)]
pub enum InitiateOutcome {
    /// A new session was created
    Created(UploadSession),
    /// Identical content is already stored; no session was created
    Duplicate {
        /// Relative path of the existing object
        storage_path: String,
    },
}

/// Outcome of a chunk receipt
#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    /// The staged chunk's index
    pub chunk_index: u64,
    /// Distinct chunks staged so far
    pub uploaded_chunks: u64,
    /// Expected chunk count
    pub total_chunks: u64,
    /// Progress percentage (two decimals)
    pub progress: f64,
    /// Whether this index had already been staged (replay)
    pub already_staged: bool,
}

/// Orchestrator for the upload protocol
#[derive(Debug)]
pub struct UploadManager {
    config: Arc<Config>,
    db: Arc<SessionDb>,
    staging: Arc<ChunkStaging>,
    store: Arc<ObjectStore>,
    dedup: Arc<DedupIndex>,
    /// Per-session critical sections
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UploadManager {
    /// Wire a manager over its service dependencies
    pub fn new(
        config: Arc<Config>,
        db: Arc<SessionDb>,
        staging: Arc<ChunkStaging>,
        store: Arc<ObjectStore>,
        dedup: Arc<DedupIndex>,
    ) -> Self {
        Self {
            config,
            db,
            staging,
            store,
            dedup,
            locks: DashMap::new(),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of a session that reached a terminal state.
    ///
    /// A later call for the same id recreates the entry, observes the
    /// terminal state, and fails with Conflict.
    fn release_lock(&self, session_id: &str) {
        self.locks.remove(session_id);
    }

    /// Start a new upload session, or short-circuit on known content.
    pub async fn initiate(
        &self,
        filename: &str,
        media_type: &str,
        file_size: u64,
        md5_hex: &str,
        owner: Option<String>,
    ) -> Result<InitiateOutcome> {
        let errors = validation::validate_metadata(
            filename,
            media_type,
            file_size,
            md5_hex,
            &self.config.upload,
        );
        if !errors.is_empty() {
            return Err(AppError::InvalidMetadata(errors));
        }

        if let Some(storage_path) = self.dedup.lookup(md5_hex).await? {
            info!(
                digest = %md5_hex,
                path = %storage_path,
                "Duplicate content, suppressing new session"
            );
            return Ok(InitiateOutcome::Duplicate { storage_path });
        }

        let session = UploadSession::new(
            filename.to_string(),
            media_type.to_string(),
            file_size,
            md5_hex.to_string(),
            owner,
            self.config.upload.chunk_size,
        );

        self.db.insert(&session)?;

        info!(
            session_id = %session.id,
            total_size = file_size,
            total_chunks = session.total_chunks,
            "Created upload session"
        );

        Ok(InitiateOutcome::Created(session))
    }

    /// Stage one chunk and advance the session's progress counters.
    ///
    /// Chunks may arrive in any order. Re-sending an already staged index
    /// succeeds without rewriting the file or bumping the counter.
    pub async fn receive_chunk(
        &self,
        session_id: &str,
        chunk_index: u64,
        data: Bytes,
    ) -> Result<ChunkReceipt> {
        // Probe before taking a lock so unknown ids don't populate the registry
        if self.db.get(session_id)?.is_none() {
            return Err(AppError::not_found(format!(
                "Upload session not found: {}",
                session_id
            )));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self
            .db
            .get(session_id)?
            .ok_or_else(|| AppError::not_found(format!("Upload session not found: {}", session_id)))?;

        if !session.state.can_accept_chunks() {
            return Err(AppError::conflict(format!(
                "Session {} is {} and no longer accepts chunks",
                session_id,
                session.state.as_str()
            )));
        }

        if chunk_index >= session.total_chunks {
            return Err(AppError::invalid_argument(format!(
                "chunkIndex {} is out of range for {} chunks",
                chunk_index, session.total_chunks
            )));
        }

        if self.staging.has_chunk(session_id, chunk_index) {
            return Ok(ChunkReceipt {
                chunk_index,
                uploaded_chunks: session.uploaded_chunks,
                total_chunks: session.total_chunks,
                progress: session.progress_percent(),
                already_staged: true,
            });
        }

        self.staging
            .stage_chunk(session_id, chunk_index, &data)
            .await?;

        session.record_chunk();
        self.db.update(&session)?;

        Ok(ChunkReceipt {
            chunk_index,
            uploaded_chunks: session.uploaded_chunks,
            total_chunks: session.total_chunks,
            progress: session.progress_percent(),
            already_staged: false,
        })
    }

    /// Reassemble, verify, validate, and materialise a complete upload.
    ///
    /// Finalize on an already Completed session returns the existing stored
    /// path. Integrity, content, and data-loss failures move the session to
    /// Failed and keep the staged chunks for inspection; internal errors
    /// leave the session untouched so the client can retry.
    pub async fn finalize(&self, session_id: &str) -> Result<String> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self
            .db
            .get(session_id)?
            .ok_or_else(|| AppError::not_found(format!("Upload session not found: {}", session_id)))?;

        match session.state {
            UploadState::Completed => {
                return session.storage_path.clone().ok_or_else(|| {
                    AppError::internal(format!(
                        "Completed session {} has no stored path",
                        session_id
                    ))
                });
            }
            UploadState::Failed | UploadState::Cancelled => {
                return Err(AppError::conflict(format!(
                    "Session {} is {} and cannot be finalized",
                    session_id,
                    session.state.as_str()
                )));
            }
            UploadState::Initiated | UploadState::Uploading => {}
        }

        if !session.is_complete() {
            return Err(AppError::failed_precondition(format!(
                "Upload incomplete: {} of {} chunks staged",
                session.uploaded_chunks, session.total_chunks
            )));
        }

        match self.run_pipeline(&session).await {
            Ok(storage_path) => {
                session.mark_completed(storage_path.clone());
                self.db.update(&session)?;

                if let Err(e) = self.staging.purge(session_id).await {
                    warn!(session_id = %session_id, error = %e, "Failed to purge staging after finalize");
                }
                self.release_lock(session_id);

                info!(
                    session_id = %session_id,
                    path = %storage_path,
                    "Finalized upload"
                );

                Ok(storage_path)
            }
            Err(e) if e.fails_session() => {
                session.mark_failed(e.to_string());
                self.db.update(&session)?;
                self.release_lock(session_id);

                warn!(session_id = %session_id, error = %e, "Finalize failed");

                // Staged chunks stay behind for inspection; the sweeper
                // reclaims them once the staging directory ages out
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The finalisation pipeline: reassemble, digest-verify,
    /// content-validate, materialise, register.
    async fn run_pipeline(&self, session: &UploadSession) -> Result<String> {
        let assembled = self.staging.assembly_path(&session.id);

        self.staging
            .reassemble(&session.id, session.total_chunks, &assembled)
            .await?;

        if !digest::verify(&assembled, &session.md5_hex).await? {
            self.discard(&assembled).await;
            return Err(AppError::integrity(format!(
                "MD5 digest of the assembled file does not match the declared {}",
                session.md5_hex
            )));
        }

        match validation::validate_content(&assembled, &session.media_type).await? {
            ContentCheck::Ok => {}
            ContentCheck::Mismatch { detected } => {
                self.discard(&assembled).await;
                return Err(AppError::invalid_content(format!(
                    "Content signature matches {} but {} was declared",
                    detected, session.media_type
                )));
            }
            ContentCheck::UndetectedType => {
                self.discard(&assembled).await;
                return Err(AppError::invalid_content(format!(
                    "Content signature does not match any known type for declared {}",
                    session.media_type
                )));
            }
        }

        let storage_path = self
            .store
            .store(&assembled, &session.filename, session.owner.as_deref())
            .await?;

        // Index lag only costs a missed dedup hit for this one file, so a
        // register failure must not fail an already materialised upload
        if let Err(e) = self.dedup.register(&session.md5_hex, &storage_path).await {
            warn!(
                session_id = %session.id,
                error = %e,
                "Failed to register dedup entry"
            );
        }

        Ok(storage_path)
    }

    async fn discard(&self, assembled: &std::path::Path) {
        if let Err(e) = fs::remove_file(assembled).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %assembled.display(), error = %e, "Failed to remove assembly file");
            }
        }
    }

    /// Current session attributes, including derived progress
    pub async fn status(&self, session_id: &str) -> Result<UploadSession> {
        self.db
            .get(session_id)?
            .ok_or_else(|| AppError::not_found(format!("Upload session not found: {}", session_id)))
    }

    /// Cancel an open session and reclaim its staging directory.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self
            .db
            .get(session_id)?
            .ok_or_else(|| AppError::not_found(format!("Upload session not found: {}", session_id)))?;

        if session.state.is_terminal() {
            return Err(AppError::conflict(format!(
                "Session {} is already {}",
                session_id,
                session.state.as_str()
            )));
        }

        session.mark_cancelled();
        self.db.update(&session)?;
        self.release_lock(session_id);

        info!(session_id = %session_id, "Cancelled upload session");

        // Staging cleanup happens off the request path
        let staging = Arc::clone(&self.staging);
        let id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = staging.purge(&id).await {
                warn!(session_id = %id, error = %e, "Failed to purge staging after cancel");
            }
        });

        Ok(())
    }
}
