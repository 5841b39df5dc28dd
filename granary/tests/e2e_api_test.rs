// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP End-to-End Tests
//!
//! Boots the real server on an ephemeral port and exercises the API with
//! a real client: multipart uploads, asynchronous status polling,
//! paginated results, and the admission rejections. Background processing
//! is enabled, so these tests watch a file travel the whole pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use granary::application::IngestSystem;
use granary::infrastructure::config::AppConfig;
use granary::infrastructure::repositories::{
    ensure_schema, initialize_database, SqliteIngestRepository,
};
use granary_domain::{ChunkSize, RetryPolicy};

struct TestServer {
    base_url: String,
    system: IngestSystem,
    _dir: TempDir,
}

async fn spawn_server(chunk_rows: u32, max_upload_mb: u64) -> TestServer {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        database_url: format!("sqlite://{}", dir.path().join("granary.db").display()),
        max_concurrency: 4,
        chunk_size: ChunkSize::new(chunk_rows).unwrap(),
        retry_policy: RetryPolicy::new(3, 0.01, 0.05).unwrap(),
        max_upload_mb,
        allowed_content_types: vec!["text/csv".to_string(), "application/csv".to_string()],
        delete_file_on_complete: false,
        disable_background: false,
        storage_dir: dir.path().join("uploads"),
        bind_addr: "127.0.0.1:0".to_string(),
    };

    let pool = initialize_database(&config.database_url).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    let repository = Arc::new(SqliteIngestRepository::new(pool));
    let system = IngestSystem::builder(config)
        .repository(repository)
        .without_jitter()
        .build()
        .unwrap();
    system.recover().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = system.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        system,
        _dir: dir,
    }
}

fn csv_part(content: Vec<u8>, mime: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(content)
            .file_name("test.csv")
            .mime_str(mime)
            .unwrap(),
    )
}

async fn upload_csv(
    client: &reqwest::Client,
    server: &TestServer,
    content: &str,
    priority: Option<u8>,
) -> reqwest::Response {
    let mut url = format!("{}/upload", server.base_url);
    if let Some(priority) = priority {
        url = format!("{}?priority={}", url, priority);
    }
    client
        .post(url)
        .multipart(csv_part(content.as_bytes().to_vec(), "text/csv"))
        .send()
        .await
        .unwrap()
}

async fn wait_for_terminal_status(
    client: &reqwest::Client,
    server: &TestServer,
    file_id: &str,
) -> serde_json::Value {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status: serde_json::Value = client
            .get(format!("{}/status/{}", server.base_url, file_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let state = status["status"].as_str().unwrap();
        if ["completed", "completed_with_errors", "failed"].contains(&state) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for terminal status, last: {}",
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn uploads_dir_entries(server: &TestServer) -> usize {
    match std::fs::read_dir(server._dir.path().join("uploads")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_upload_status_results_flow_and_pagination() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    let csv = "name,age,city\nJohn,25,NYC\nJane,30,LA\nBob,35,Chicago\nAlice,28,Boston\nCharlie,32,Seattle\n";
    let response = upload_csv(&client, &server, csv, Some(5)).await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let file_id = body["file_id"].as_str().unwrap().to_string();

    let status = wait_for_terminal_status(&client, &server, &file_id).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["id"], file_id);
    assert_eq!(status["filename"], "test.csv");
    assert_eq!(status["total_chunks"], 1);
    assert_eq!(status["processed_chunks"], 1);
    assert_eq!(status["failed_chunks"], 0);
    assert_eq!(status["progress_percent"], 100.0);

    // Page 1 of 3.
    let page: serde_json::Value = client
        .get(format!("{}/results/{}?page=1&size=2", server.base_url, file_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 5);
    assert_eq!(page["page"], 1);
    assert_eq!(page["size"], 2);
    assert_eq!(page["pages"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["results"][0]["chunk_index"], 0);
    // Each record holds one source row as an ordered field array.
    assert_eq!(page["results"][0]["data"].as_array().unwrap().len(), 3);

    // Last page holds the remainder.
    let page: serde_json::Value = client
        .get(format!("{}/results/{}?page=3&size=2", server.base_url, file_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["results"].as_array().unwrap().len(), 1);

    // Past the end: empty page, same totals.
    let page: serde_json::Value = client
        .get(format!("{}/results/{}?page=9&size=2", server.base_url, file_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["results"].as_array().unwrap().len(), 0);
    assert_eq!(page["total"], 5);

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_chunked_upload_processes_every_row() {
    let server = spawn_server(5, 10).await;
    let client = reqwest::Client::new();

    let mut csv = String::from("id,name\n");
    for i in 0..23 {
        csv.push_str(&format!("{},row-{}\n", i, i));
    }
    let response = upload_csv(&client, &server, &csv, None).await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let file_id = body["file_id"].as_str().unwrap().to_string();

    let status = wait_for_terminal_status(&client, &server, &file_id).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["total_chunks"], 5);
    assert_eq!(status["processed_chunks"], 5);

    // Walk all pages; global order is (chunk_index, id).
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let body: serde_json::Value = client
            .get(format!(
                "{}/results/{}?page={}&size=10",
                server.base_url, file_id, page
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let results = body["results"].as_array().unwrap();
        if results.is_empty() {
            break;
        }
        rows.extend(results.iter().cloned());
        page += 1;
    }
    assert_eq!(rows.len(), 23);
    let mut last_chunk = 0;
    for row in &rows {
        let chunk_index = row["chunk_index"].as_u64().unwrap();
        assert!(chunk_index >= last_chunk, "chunk_index must be non-decreasing");
        last_chunk = chunk_index;
    }

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_structural_failure_is_async_and_visible_in_status() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    // Admission accepts the upload; the planner then fails the file.
    let response = upload_csv(&client, &server, "name,age\nJohn,25,NYC\nJane,30\n", None).await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let file_id = body["file_id"].as_str().unwrap().to_string();

    let status = wait_for_terminal_status(&client, &server, &file_id).await;
    assert_eq!(status["status"], "failed");
    assert!(status["error_message"]
        .as_str()
        .unwrap()
        .contains("CSV validation failed"));
    assert_eq!(status["total_chunks"], 0);

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_unknown_file_returns_404() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/status/nonexistent-id", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(format!("{}/results/nonexistent-id", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Well-formed but unknown ids behave the same.
    let ghost = uuid::Uuid::new_v4();
    let response = client
        .get(format!("{}/status/{}", server.base_url, ghost))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_rejects_wrong_content_type() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/upload", server.base_url))
        .multipart(csv_part(b"id,name\n1,A\n".to_vec(), "text/plain"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Only CSV files"));

    // Nothing persisted: no blob, no file row.
    assert_eq!(uploads_dir_entries(&server), 0);

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_rejects_oversized_upload() {
    let server = spawn_server(1000, 1).await; // 1 MB cap
    let client = reqwest::Client::new();

    let mut payload = b"id,name\n".to_vec();
    payload.extend(std::iter::repeat_n(b'x', 2 * 1024 * 1024));
    let response = client
        .post(format!("{}/upload", server.base_url))
        .multipart(csv_part(payload, "text/csv"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("File size exceeds"));

    // The partial blob was discarded.
    assert_eq!(uploads_dir_entries(&server), 0);

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_rejects_out_of_range_priority_and_pagination() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    let response = upload_csv(&client, &server, "id\n1\n", Some(11)).await;
    assert_eq!(response.status(), 400);

    let upload = upload_csv(&client, &server, "id\n1\n", None).await;
    let body: serde_json::Value = upload.json().await.unwrap();
    let file_id = body["file_id"].as_str().unwrap().to_string();

    for query in ["page=0&size=10", "page=1&size=0", "page=1&size=101"] {
        let response = client
            .get(format!("{}/results/{}?{}", server.base_url, file_id, query))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query '{}' must be rejected", query);
    }

    server.system.shutdown().await;
}

#[tokio::test]
async fn test_health() {
    let server = spawn_server(1000, 10).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.system.shutdown().await;
}
