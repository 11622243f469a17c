//! Upload session model for chunked uploads.
//!
//! This module defines the `UploadSession` entity that tracks the state
//! of chunked/resumable uploads from initiation to a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of an upload session.
///
/// Transitions are monotonic: Initiated moves to Uploading on the first
/// staged chunk; Completed, Failed, and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Session created, no chunk staged yet
    Initiated,
    /// At least one chunk staged, accepting more
    Uploading,
    /// Finalised; stored object recorded
    Completed,
    /// Finalisation hit an integrity or validation error
    Failed,
    /// Cancelled by the client or swept
    Cancelled,
}

impl UploadState {
    /// Convert to the lower-cased wire/store representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the wire/store representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(Self::Initiated),
            "uploading" => Some(Self::Uploading),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if the session can accept more chunks
    pub fn can_accept_chunks(&self) -> bool {
        matches!(self, Self::Initiated | Self::Uploading)
    }

    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// All states, for iteration over the state index
    pub fn all() -> [UploadState; 5] {
        [
            Self::Initiated,
            Self::Uploading,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

/// Upload session tracking one upload attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier (`YYYYMMDDHHMMSS-{16 hex}`)
    pub id: String,

    /// Opaque owner token, if the client supplied one
    pub owner: Option<String>,

    /// Original filename
    pub filename: String,

    /// Declared MIME type of the file being uploaded
    pub media_type: String,

    /// Total declared file size in bytes
    pub total_size: u64,

    /// Declared MD5 content digest (lower-cased hex)
    pub md5_hex: String,

    /// Expected number of chunks
    pub total_chunks: u64,

    /// Number of distinct chunks staged so far
    pub uploaded_chunks: u64,

    /// Current session state
    pub state: UploadState,

    /// Relative stored-object path (set when completed)
    pub storage_path: Option<String>,

    /// Error message if failed
    pub error_message: Option<String>,

    /// Session creation timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent staged chunk
    pub last_chunk_at: Option<DateTime<Utc>>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// Create a new upload session in state Initiated
    pub fn new(
        filename: String,
        media_type: String,
        total_size: u64,
        md5_hex: String,
        owner: Option<String>,
        chunk_size: u64,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            owner,
            filename,
            media_type,
            total_size,
            md5_hex: md5_hex.to_ascii_lowercase(),
            total_chunks: total_size.div_ceil(chunk_size),
            uploaded_chunks: 0,
            state: UploadState::Initiated,
            storage_path: None,
            error_message: None,
            created_at: Utc::now(),
            last_chunk_at: None,
            completed_at: None,
        }
    }

    /// Generate a session id of the form `YYYYMMDDHHMMSS-{16 hex chars}`
    pub fn generate_id() -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let nonce = Uuid::new_v4().as_simple().to_string();
        format!("{}-{}", stamp, &nonce[..16])
    }

    /// Upload progress as a percentage with at most two decimals
    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        let raw = (self.uploaded_chunks as f64 / self.total_chunks as f64) * 100.0;
        (raw * 100.0).round() / 100.0
    }

    /// Check if all chunks have been staged
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks >= self.total_chunks
    }

    /// Record one newly staged chunk: bump the counter, promote
    /// Initiated to Uploading, refresh the last-chunk timestamp
    pub fn record_chunk(&mut self) {
        self.uploaded_chunks += 1;
        if self.state == UploadState::Initiated {
            self.state = UploadState::Uploading;
        }
        self.last_chunk_at = Some(Utc::now());
    }

    /// Mark session as completed with the stored-object path
    pub fn mark_completed(&mut self, storage_path: impl Into<String>) {
        self.state = UploadState::Completed;
        self.storage_path = Some(storage_path.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark session as failed with an error message
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = UploadState::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark session as cancelled
    pub fn mark_cancelled(&mut self) {
        self.state = UploadState::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// Wire view of a session, returned by the status endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session ID
    pub upload_id: String,

    /// Original filename
    pub filename: String,

    /// Declared MIME type
    pub mime_type: String,

    /// Declared total size in bytes
    pub file_size: u64,

    /// Declared MD5 digest (hex)
    pub md5_hash: String,

    /// Expected chunk count
    pub total_chunks: u64,

    /// Chunks staged so far
    pub uploaded_chunks: u64,

    /// Progress percentage (two decimals)
    pub progress: f64,

    /// Lower-cased state name
    pub status: &'static str,

    /// Owner token, if supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Stored-object path if completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp (ISO 8601)
    pub created_at: DateTime<Utc>,

    /// Last-chunk timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_at: Option<DateTime<Utc>>,

    /// Completion timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionView {
    /// Create a view from a session
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            upload_id: session.id.clone(),
            filename: session.filename.clone(),
            mime_type: session.media_type.clone(),
            file_size: session.total_size,
            md5_hash: session.md5_hex.clone(),
            total_chunks: session.total_chunks,
            uploaded_chunks: session.uploaded_chunks,
            progress: session.progress_percent(),
            status: session.state.as_str(),
            owner: session.owner.clone(),
            storage_path: session.storage_path.clone(),
            error: session.error_message.clone(),
            created_at: session.created_at,
            last_chunk_at: session.last_chunk_at,
            completed_at: session.completed_at,
        }
    }
}
