//! Upload protocol handlers.
//!
//! These endpoints implement the chunked-upload protocol:
//!
//! - `POST /initiate` - Declare a file and open a session
//! - `POST /chunk` - Submit one chunk (multipart form)
//! - `POST /finalize` - Reassemble, verify, and store the file
//! - `GET /status/{uploadId}` - Session progress (for resuming)
//! - `POST /cancel/{uploadId}` - Abandon a session
//! - `GET /config` - Upload limits advertised to clients
//!
//! An opaque owner token may be supplied via the `X-User-Id` header on
//! initiation; absence means anonymous.
//!
//! # Example
//!
//! ```bash
//! # 1. Initiate
//! curl -X POST http://localhost:3000/api/upload/initiate \
//!   -H "Content-Type: application/json" \
//!   -d '{"filename":"large.jpg","mimeType":"image/jpeg","fileSize":10485760,"md5Hash":"..."}'
//!
//! # 2. Upload chunks (any order)
//! curl -X POST http://localhost:3000/api/upload/chunk \
//!   -F "uploadId={id}" -F "chunkIndex=0" -F "chunk=@chunk0"
//!
//! # 3. Finalize
//! curl -X POST http://localhost:3000/api/upload/finalize \
//!   -H "Content-Type: application/json" -d '{"uploadId":"{id}"}'
//! ```

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::SessionView;
use crate::services::{ChunkReceipt, InitiateOutcome};
use crate::state::AppState;

// =============================================================================
// Request / response DTOs
// =============================================================================

/// Request body for initiating an upload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    /// Original filename
    pub filename: String,

    /// Declared MIME type
    pub mime_type: String,

    /// Total file size in bytes
    pub file_size: u64,

    /// MD5 digest of the full file (hex)
    pub md5_hash: String,
}

/// Response for a newly created session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,
    pub upload_id: String,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

/// Response when identical content is already stored
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponse {
    pub success: bool,
    pub duplicate: bool,
    pub storage_path: String,
}

/// Response for a chunk submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub chunk_index: u64,
    pub uploaded_chunks: u64,
    pub total_chunks: u64,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ChunkResponse {
    fn from_receipt(receipt: &ChunkReceipt) -> Self {
        Self {
            success: true,
            chunk_index: receipt.chunk_index,
            uploaded_chunks: receipt.uploaded_chunks,
            total_chunks: receipt.total_chunks,
            progress: receipt.progress,
            message: receipt
                .already_staged
                .then(|| "Chunk already uploaded".to_string()),
        }
    }
}

/// Request body for finalizing an upload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub upload_id: String,
}

/// Response for a finalized upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub success: bool,
    pub message: String,
    pub storage_path: String,
    pub upload_id: String,
}

/// Response for a status query
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub data: SessionView,
}

/// Response for a cancel request
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Upload limits advertised to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
    pub chunk_size: u64,
    pub max_files: u32,
    pub max_parallel_uploads: u32,
}

/// Response for the config endpoint
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: PublicConfig,
}

// =============================================================================
// Handlers
// =============================================================================

/// Extract the optional owner token from the `X-User-Id` header
fn owner_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-user-id")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

/// Initiate an upload session
///
/// POST /initiate
async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner = owner_from_headers(&headers);

    let outcome = state
        .manager
        .initiate(
            &request.filename,
            &request.mime_type,
            request.file_size,
            &request.md5_hash,
            owner,
        )
        .await?;

    let response = match outcome {
        InitiateOutcome::Created(session) => serde_json::to_value(InitiateResponse {
            success: true,
            upload_id: session.id,
            total_chunks: session.total_chunks,
            chunk_size: state.chunk_size(),
        })?,
        InitiateOutcome::Duplicate { storage_path } => serde_json::to_value(DuplicateResponse {
            success: true,
            duplicate: true,
            storage_path,
        })?,
    };

    Ok(Json(response))
}

/// Submit one chunk as a multipart form with fields
/// `uploadId`, `chunkIndex`, and `chunk`
///
/// POST /chunk
async fn chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkResponse>> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<u64> = None;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_argument(format!("Invalid multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "uploadId" => {
                let text = field.text().await.map_err(|e| {
                    AppError::invalid_argument(format!("Failed to read uploadId: {}", e))
                })?;
                upload_id = Some(text);
            }
            "chunkIndex" => {
                let text = field.text().await.map_err(|e| {
                    AppError::invalid_argument(format!("Failed to read chunkIndex: {}", e))
                })?;
                let index = text.trim().parse::<u64>().map_err(|_| {
                    AppError::invalid_argument(format!(
                        "chunkIndex '{}' is not a non-negative integer",
                        text
                    ))
                })?;
                chunk_index = Some(index);
            }
            "chunk" => {
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::invalid_argument(format!("Failed to read chunk: {}", e))
                })?;
                data = Some(bytes);
            }
            _ => {}
        }
    }

    let upload_id =
        upload_id.ok_or_else(|| AppError::invalid_argument("Missing form field: uploadId"))?;
    let chunk_index =
        chunk_index.ok_or_else(|| AppError::invalid_argument("Missing form field: chunkIndex"))?;
    let data = data.ok_or_else(|| AppError::invalid_argument("Missing form field: chunk"))?;

    let receipt = state
        .manager
        .receive_chunk(&upload_id, chunk_index, data)
        .await?;

    Ok(Json(ChunkResponse::from_receipt(&receipt)))
}

/// Finalize an upload
///
/// POST /finalize
async fn finalize(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>> {
    let storage_path = state.manager.finalize(&request.upload_id).await?;

    info!(upload_id = %request.upload_id, path = %storage_path, "Upload finalized");

    Ok(Json(FinalizeResponse {
        success: true,
        message: "Upload completed".to_string(),
        storage_path,
        upload_id: request.upload_id,
    }))
}

/// Get session status
///
/// GET /status/{uploadId}
async fn status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let session = state.manager.status(&upload_id).await?;

    Ok(Json(StatusResponse {
        success: true,
        data: SessionView::from_session(&session),
    }))
}

/// Cancel a session
///
/// POST /cancel/{uploadId}
async fn cancel(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<CancelResponse>> {
    state.manager.cancel(&upload_id).await?;

    Ok(Json(CancelResponse {
        success: true,
        message: "Upload cancelled".to_string(),
    }))
}

/// Advertise upload limits
///
/// GET /config
async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let upload = &state.config.upload;

    Json(ConfigResponse {
        success: true,
        config: PublicConfig {
            max_file_size: upload.max_file_size,
            allowed_types: upload.allowed_types.clone(),
            chunk_size: upload.chunk_size,
            max_files: upload.max_files,
            max_parallel_uploads: upload.max_parallel_uploads,
        },
    })
}

/// Create upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(initiate))
        .route("/chunk", post(chunk))
        .route("/finalize", post(finalize))
        .route("/status/{upload_id}", get(status))
        .route("/cancel/{upload_id}", post(cancel))
        .route("/config", get(config))
}
