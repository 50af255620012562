//! Integration tests for file upload and the live `/events` stream.

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpListener;

use filecast_server::events::{SubscriberRegistry, UploadEvent};
use filecast_server::state::AppState;
use filecast_server::uploads::BlobStore;

struct TestServer {
    base_url: String,
    state: AppState,
    upload_dir: String,
    _tmp_dir: tempfile::TempDir,
}

/// Helper: start the server on a random port with the given upload limit.
async fn start_test_server(max_upload_bytes: u64) -> TestServer {
    start_test_server_with(max_upload_bytes, None).await
}

async fn start_test_server_with(max_upload_bytes: u64, keep_alive: Option<Duration>) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().join("data").to_str().unwrap().to_string();
    let upload_dir = tmp_dir.path().join("uploads").to_str().unwrap().to_string();

    let db = filecast_server::db::init_db(&data_dir).expect("Failed to init DB");

    let state = AppState {
        db,
        subscribers: SubscriberRegistry::new(16),
        blobs: BlobStore::new(upload_dir.clone(), max_upload_bytes),
        keep_alive,
    };

    let app = filecast_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
        upload_dir,
        _tmp_dir: tmp_dir,
    }
}

/// Reads `data:` payloads off an open SSE response.
struct EventReader {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buf: String,
}

impl EventReader {
    fn new(resp: reqwest::Response) -> Self {
        Self {
            body: Box::pin(resp.bytes_stream()),
            buf: String::new(),
        }
    }

    /// Next frame's data, or `None` on timeout or end of stream.
    async fn next_data(&mut self, wait: Duration) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..end + 2).collect();
                if let Some(data) = frame.lines().find_map(|l| l.strip_prefix("data: ")) {
                    return Some(data.to_string());
                }
                // Comment or keep-alive frame
                continue;
            }
            match tokio::time::timeout(wait, self.body.next()).await {
                Ok(Some(Ok(chunk))) => self.buf.push_str(std::str::from_utf8(&chunk).unwrap()),
                _ => return None,
            }
        }
    }

    /// Next comment frame (`:` line), skipping data frames.
    async fn next_comment(&mut self, wait: Duration) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..end + 2).collect();
                if frame.starts_with(':') {
                    return Some(frame);
                }
                continue;
            }
            match tokio::time::timeout(wait, self.body.next()).await {
                Ok(Some(Ok(chunk))) => self.buf.push_str(std::str::from_utf8(&chunk).unwrap()),
                _ => return None,
            }
        }
    }

    /// Whether the server ends the stream within `wait`.
    async fn ends_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.body.next()).await {
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) | Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// Open `GET /events`; registration is complete once the headers arrive.
async fn subscribe(server: &TestServer) -> EventReader {
    let resp = reqwest::Client::new()
        .get(format!("{}/events", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    EventReader::new(resp)
}

async fn upload(server: &TestServer, filename: &str, contents: &[u8]) -> reqwest::Response {
    let part = Part::bytes(contents.to_vec())
        .file_name(filename.to_string())
        .mime_str("application/octet-stream")
        .unwrap();
    reqwest::Client::new()
        .post(format!("{}/upload", server.base_url))
        .multipart(Form::new().text("note", "ignored").part("file", part))
        .send()
        .await
        .unwrap()
}

async fn wait_for_subscribers(server: &TestServer, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.state.subscribers.len() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Expected {} subscribers, have {}",
            expected,
            server.state.subscribers.len()
        );
        // A write to a closed connection also surfaces the disconnect.
        server.state.subscribers.broadcast(&json!({"probe": true}));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_events_response_headers() {
    let server = start_test_server(1024 * 1024).await;
    let resp = reqwest::Client::new()
        .get(format!("{}/events", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let headers = resp.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");
    assert_eq!(server.state.subscribers.len(), 1);
}

#[tokio::test]
async fn test_keep_alive_comments_before_any_upload() {
    let server = start_test_server_with(1024 * 1024, Some(Duration::from_millis(100))).await;
    let resp = reqwest::Client::new()
        .get(format!("{}/events", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["connection"], "keep-alive");

    let mut reader = EventReader::new(resp);
    assert!(reader.next_comment(WAIT).await.is_some());
    assert_eq!(server.state.subscribers.broadcast_count(), 0);

    // Data frames still flow on a keep-alive stream
    let resp = upload(&server, "kept.txt", b"alive").await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert_eq!(reader.next_data(WAIT).await.as_deref(), Some(body.as_str()));
}

#[tokio::test]
async fn test_upload_notifies_every_subscriber_with_response_body() {
    let server = start_test_server(1024 * 1024).await;
    let mut a = subscribe(&server).await;
    let mut b = subscribe(&server).await;
    assert_eq!(server.state.subscribers.len(), 2);

    let resp = upload(&server, "x.png", b"\x89PNG fake image").await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();

    let event: UploadEvent = serde_json::from_str(&body).unwrap();
    assert_eq!(event.filename, "x.png");
    assert!(event.path.starts_with(&server.upload_dir));
    assert!(event.path.ends_with(".png"));
    assert_eq!(std::fs::read(&event.path).unwrap(), b"\x89PNG fake image");

    // Broadcast payload matches the HTTP response byte for byte
    assert_eq!(a.next_data(WAIT).await.as_deref(), Some(body.as_str()));
    assert_eq!(b.next_data(WAIT).await.as_deref(), Some(body.as_str()));

    // Exactly one frame per upload
    assert!(a.next_data(Duration::from_millis(200)).await.is_none());
    assert_eq!(server.state.subscribers.broadcast_count(), 1);
}

#[tokio::test]
async fn test_disconnected_subscriber_is_removed() {
    let server = start_test_server(1024 * 1024).await;
    let a = subscribe(&server).await;
    let mut b = subscribe(&server).await;
    assert_eq!(server.state.subscribers.len(), 2);

    drop(a);
    wait_for_subscribers(&server, 1).await;

    // Drain probes sent while waiting
    while let Some(data) = b.next_data(Duration::from_millis(100)).await {
        assert_eq!(data, r#"{"probe":true}"#);
    }

    let resp = upload(&server, "second.txt", b"two").await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert_eq!(b.next_data(WAIT).await.as_deref(), Some(body.as_str()));
}

#[tokio::test]
async fn test_upload_without_file_field_is_rejected() {
    let server = start_test_server(1024 * 1024).await;
    let mut listener = subscribe(&server).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload", server.base_url))
        .multipart(Form::new().text("not_file", "hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "No file uploaded"}));

    // Not multipart at all
    let resp = client
        .post(format!("{}/upload", server.base_url))
        .body("plain body")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "No file uploaded"}));

    assert_eq!(server.state.subscribers.broadcast_count(), 0);
    assert!(listener.next_data(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn test_file_field_without_filename_is_rejected() {
    let server = start_test_server(1024 * 1024).await;
    let mut listener = subscribe(&server).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/upload", server.base_url))
        .multipart(Form::new().text("file", "just text"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "No file uploaded"}));

    assert_eq!(server.state.subscribers.broadcast_count(), 0);
    assert!(listener.next_data(Duration::from_millis(200)).await.is_none());
    let stored = std::fs::read_dir(&server.upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_oversize_upload_is_rejected_without_broadcast() {
    let server = start_test_server(1024).await;

    let resp = upload(&server, "big.bin", &[7u8; 4096]).await;
    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("maximum size"));

    assert_eq!(server.state.subscribers.broadcast_count(), 0);
    let stored = std::fs::read_dir(&server.upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_late_subscriber_gets_no_replay() {
    let server = start_test_server(1024 * 1024).await;

    let resp = upload(&server, "early.txt", b"early").await;
    assert_eq!(resp.status(), 200);

    let mut late = subscribe(&server).await;
    assert!(late.next_data(Duration::from_millis(300)).await.is_none());

    let resp = upload(&server, "later.txt", b"later").await;
    let body = resp.text().await.unwrap();
    assert_eq!(late.next_data(WAIT).await.as_deref(), Some(body.as_str()));
}

#[tokio::test]
async fn test_concurrent_uploads_get_unique_paths() {
    let server = start_test_server(1024 * 1024).await;
    let mut reader = subscribe(&server).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let base_url = server.base_url.clone();
        handles.push(tokio::spawn(async move {
            let part = Part::bytes(format!("file {}", i).into_bytes()).file_name("same.txt");
            let resp = reqwest::Client::new()
                .post(format!("{}/upload", base_url))
                .multipart(Form::new().part("file", part))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            resp.json::<UploadEvent>().await.unwrap().path
        }));
    }

    let mut paths = std::collections::HashSet::new();
    for handle in handles {
        paths.insert(handle.await.unwrap());
    }
    assert_eq!(paths.len(), 8);

    let mut announced = std::collections::HashSet::new();
    for _ in 0..8 {
        let data = reader.next_data(WAIT).await.expect("Missing upload event");
        let event: UploadEvent = serde_json::from_str(&data).unwrap();
        announced.insert(event.path);
    }
    assert_eq!(announced, paths);
}

#[tokio::test]
async fn test_registry_shutdown_ends_streams() {
    let server = start_test_server(1024 * 1024).await;
    let mut reader = subscribe(&server).await;

    server.state.subscribers.shutdown();

    assert!(reader.ends_within(WAIT).await);
    assert!(server.state.subscribers.is_empty());
}
