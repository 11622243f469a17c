//! Upload protocol integration tests: the happy path, ordering, replay,
//! status reporting, and the advertised configuration.

mod common;

use common::{
    chunks_of, finalize, initiate, jpeg_bytes, md5_hex, send_chunk, TestServer, TEST_CHUNK_SIZE,
};
use serde_json::Value;

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .get(server.url("/health"))
        .send()
        .await
        .expect("Failed to get health");

    assert!(response.status().is_success());
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_config_endpoint() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .get(server.url("/config"))
        .send()
        .await
        .expect("Failed to get config");

    assert!(response.status().is_success());
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["config"]["chunkSize"], TEST_CHUNK_SIZE);
    assert_eq!(json["config"]["maxFileSize"], 50 * 1024 * 1024);
    assert_eq!(json["config"]["maxParallelUploads"], 3);
    assert!(json["config"]["allowedTypes"]
        .as_array()
        .unwrap()
        .contains(&Value::from("image/jpeg")));
}

#[tokio::test]
async fn test_single_chunk_happy_path() {
    let server = TestServer::start().await;
    let client = server.client();

    // 12 bytes, JPEG signature, single chunk
    let data = jpeg_bytes(12);

    let init = initiate(&server, &client, "hi.jpg", "image/jpeg", &data).await;
    assert_eq!(init["success"], true);
    assert_eq!(init["totalChunks"], 1);
    assert_eq!(init["chunkSize"], TEST_CHUNK_SIZE);
    let upload_id = init["uploadId"].as_str().expect("uploadId missing");

    let chunk_response = send_chunk(&server, &client, upload_id, 0, &data).await;
    assert!(chunk_response.status().is_success());
    let chunk_json: Value = chunk_response.json().await.unwrap();
    assert_eq!(chunk_json["uploadedChunks"], 1);
    assert_eq!(chunk_json["progress"], 100.0);

    let final_response = finalize(&server, &client, upload_id).await;
    assert!(final_response.status().is_success());
    let final_json: Value = final_response.json().await.unwrap();
    assert_eq!(final_json["success"], true);
    assert_eq!(final_json["uploadId"], upload_id);

    // Path shape: YYYY/MM/DD/anonymous/hi_{unique}.jpg
    let storage_path = final_json["storagePath"].as_str().unwrap();
    let parts: Vec<&str> = storage_path.split('/').collect();
    assert_eq!(parts.len(), 5);
    assert!(parts[0].len() == 4 && parts[0].chars().all(|c| c.is_ascii_digit()));
    assert!(parts[1].len() == 2 && parts[1].chars().all(|c| c.is_ascii_digit()));
    assert!(parts[2].len() == 2 && parts[2].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(parts[3], "anonymous");
    assert!(parts[4].starts_with("hi_"));
    assert!(parts[4].ends_with(".jpg"));

    // Stored object is byte-equal to the upload
    let stored = tokio::fs::read(server.stored_path(storage_path)).await.unwrap();
    assert_eq!(stored, data);

    // Staging was reclaimed
    assert!(!server.staging_dir(upload_id).exists());
}

#[tokio::test]
async fn test_out_of_order_chunks() {
    let server = TestServer::start().await;
    let client = server.client();

    let data = jpeg_bytes(3 * TEST_CHUNK_SIZE as usize + 100);
    let chunks = chunks_of(&data);

    let init = initiate(&server, &client, "big.jpg", "image/jpeg", &data).await;
    assert_eq!(init["totalChunks"], 4);
    let upload_id = init["uploadId"].as_str().unwrap().to_string();

    let expected_progress = [25.0, 50.0, 75.0, 100.0];
    for (sent, index) in [3usize, 0, 2, 1].iter().enumerate() {
        let response = send_chunk(&server, &client, &upload_id, *index as u64, &chunks[*index]).await;
        assert!(response.status().is_success());

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["chunkIndex"], *index as u64);
        assert_eq!(json["uploadedChunks"], sent as u64 + 1);
        assert_eq!(json["progress"], expected_progress[sent]);
    }

    let final_response = finalize(&server, &client, &upload_id).await;
    assert!(final_response.status().is_success());

    let final_json: Value = final_response.json().await.unwrap();
    let stored = tokio::fs::read(server.stored_path(final_json["storagePath"].as_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(stored, data);
}

#[tokio::test]
async fn test_chunk_replay_reports_already_uploaded() {
    let server = TestServer::start().await;
    let client = server.client();

    let data = jpeg_bytes(4 * TEST_CHUNK_SIZE as usize);
    let chunks = chunks_of(&data);

    let init = initiate(&server, &client, "replay.jpg", "image/jpeg", &data).await;
    let upload_id = init["uploadId"].as_str().unwrap().to_string();

    for (index, chunk) in chunks.iter().enumerate() {
        send_chunk(&server, &client, &upload_id, index as u64, chunk).await;
    }

    // Resend chunk 2
    let response = send_chunk(&server, &client, &upload_id, 2, &chunks[2]).await;
    assert!(response.status().is_success());

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Chunk already uploaded");
    assert_eq!(json["chunkIndex"], 2);
    assert_eq!(json["uploadedChunks"], 4);
}

#[tokio::test]
async fn test_status_reports_progress() {
    let server = TestServer::start().await;
    let client = server.client();

    let data = jpeg_bytes(2 * TEST_CHUNK_SIZE as usize);
    let chunks = chunks_of(&data);

    let init = initiate(&server, &client, "status.jpg", "image/jpeg", &data).await;
    let upload_id = init["uploadId"].as_str().unwrap().to_string();

    let response = client
        .get(server.url(&format!("/status/{}", upload_id)))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["data"]["status"], "initiated");
    assert_eq!(json["data"]["uploadedChunks"], 0);
    assert_eq!(json["data"]["mimeType"], "image/jpeg");
    assert_eq!(json["data"]["md5Hash"], md5_hex(&data));

    send_chunk(&server, &client, &upload_id, 0, &chunks[0]).await;

    let json: Value = client
        .get(server.url(&format!("/status/{}", upload_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["data"]["status"], "uploading");
    assert_eq!(json["data"]["uploadedChunks"], 1);
    assert_eq!(json["data"]["progress"], 50.0);
}

#[tokio::test]
async fn test_status_unknown_session_is_404() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .get(server.url("/status/20260801000000-0123456789abcdef"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_owner_token_partitions_storage() {
    let server = TestServer::start().await;
    let client = server.client();

    let data = jpeg_bytes(16);

    let init: Value = client
        .post(server.url("/initiate"))
        .header("X-User-Id", "user-42")
        .json(&serde_json::json!({
            "filename": "mine.jpg",
            "mimeType": "image/jpeg",
            "fileSize": data.len(),
            "md5Hash": md5_hex(&data),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let upload_id = init["uploadId"].as_str().unwrap().to_string();

    send_chunk(&server, &client, &upload_id, 0, &data).await;

    let final_json: Value = finalize(&server, &client, &upload_id)
        .await
        .json()
        .await
        .unwrap();
    let storage_path = final_json["storagePath"].as_str().unwrap();
    assert!(storage_path.contains("/user-42/"));
}

#[tokio::test]
async fn test_initiate_rejects_bad_metadata() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .post(server.url("/initiate"))
        .json(&serde_json::json!({
            "filename": "doc.pdf",
            "mimeType": "application/pdf",
            "fileSize": 0,
            "md5Hash": "nope",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_chunk_index_out_of_range_is_400() {
    let server = TestServer::start().await;
    let client = server.client();

    let data = jpeg_bytes(16);
    let init = initiate(&server, &client, "small.jpg", "image/jpeg", &data).await;
    let upload_id = init["uploadId"].as_str().unwrap().to_string();

    let response = send_chunk(&server, &client, &upload_id, 1, &data).await;
    assert_eq!(response.status(), 400);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
}
