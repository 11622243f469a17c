//! Common test utilities and helpers.

use media_ingest_server::{
    config::{Config, LoggingConfig, RetentionConfig, ServerConfig, StorageConfig, UploadConfig},
    create_router, AppState,
};
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener as TokioTcpListener;

/// Chunk size used by test servers; small so multi-chunk uploads stay cheap
pub const TEST_CHUNK_SIZE: u64 = 1024;

/// Test server instance
pub struct TestServer {
    pub base_url: String,
    pub data_dir: TempDir,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a test server on a random port over temporary roots
    pub async fn start() -> Self {
        let port = get_available_port();
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let base_url = format!("http://127.0.0.1:{}", port);
        let config = create_test_config(&data_dir, port);

        let state = AppState::new(config)
            .await
            .expect("Failed to create app state");
        let app = create_router(state);

        let addr: std::net::SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let listener = TokioTcpListener::bind(addr)
            .await
            .expect("Failed to bind listener");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Start server in background
        tokio::spawn(async move {
            tokio::select! {
                _ = axum::serve(listener, app) => {}
                _ = shutdown_rx => {}
            }
        });

        // Give the server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url,
            data_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get HTTP client
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    /// Full URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/upload{}", self.base_url, path)
    }

    /// Staging directory of a session, for filesystem assertions
    pub fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.data_dir
            .path()
            .join("staging")
            .join(format!("upload_{}", upload_id))
    }

    /// Absolute path of a stored object
    pub fn stored_path(&self, relative: &str) -> PathBuf {
        self.data_dir.path().join("storage").join(relative)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Create test configuration
fn create_test_config(data_dir: &TempDir, port: u16) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            request_timeout: 30,
        },
        storage: StorageConfig {
            storage_root: data_dir.path().join("storage"),
            staging_root: data_dir.path().join("staging"),
            session_db_root: data_dir.path().join("sessions"),
        },
        upload: UploadConfig {
            chunk_size: TEST_CHUNK_SIZE,
            max_file_size: 50 * 1024 * 1024,
            max_files: 10,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
                "video/mp4".to_string(),
            ],
            max_parallel_uploads: 3,
        },
        retention: RetentionConfig::default(),
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Find an available TCP port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Bytes carrying a JPEG signature, padded to `len`
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.truncate(len);
    let mut fill = 0u8;
    while data.len() < len {
        data.push(fill);
        fill = fill.wrapping_add(1);
    }
    data
}

/// Lower-cased hex MD5 of a byte slice
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Initiate an upload for `data` and return the response JSON
pub async fn initiate(
    server: &TestServer,
    client: &reqwest::Client,
    filename: &str,
    mime_type: &str,
    data: &[u8],
) -> serde_json::Value {
    let body = serde_json::json!({
        "filename": filename,
        "mimeType": mime_type,
        "fileSize": data.len(),
        "md5Hash": md5_hex(data),
    });

    client
        .post(server.url("/initiate"))
        .json(&body)
        .send()
        .await
        .expect("Failed to initiate")
        .json()
        .await
        .expect("Invalid initiate response")
}

/// Send one chunk through the multipart endpoint and return the response
pub async fn send_chunk(
    server: &TestServer,
    client: &reqwest::Client,
    upload_id: &str,
    index: u64,
    data: &[u8],
) -> reqwest::Response {
    let form = reqwest::multipart::Form::new()
        .text("uploadId", upload_id.to_string())
        .text("chunkIndex", index.to_string())
        .part(
            "chunk",
            reqwest::multipart::Part::bytes(data.to_vec()).file_name("chunk.bin"),
        );

    client
        .post(server.url("/chunk"))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send chunk")
}

/// Split `data` into TEST_CHUNK_SIZE pieces
pub fn chunks_of(data: &[u8]) -> Vec<Vec<u8>> {
    data.chunks(TEST_CHUNK_SIZE as usize)
        .map(|c| c.to_vec())
        .collect()
}

/// Finalize an upload and return the raw response
pub async fn finalize(
    server: &TestServer,
    client: &reqwest::Client,
    upload_id: &str,
) -> reqwest::Response {
    client
        .post(server.url("/finalize"))
        .json(&serde_json::json!({ "uploadId": upload_id }))
        .send()
        .await
        .expect("Failed to finalize")
}
