//! ルーターを一時ディレクトリのリアルタイムデータとメモリストアで動かす

use crate::{AppState, router};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use persistence::{MemoryStore, RealtimeSource, Store};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

pub const SNAPSHOTS: &str = r#"[
    {"machine_id": "MILL-01", "temperature": 92.0, "vibration": 0.3, "rpm": 1500, "health_score": 70, "timestamp": "2025-06-01T08:00:00"},
    {"machine_id": "LATHE-02", "temperature": 55.0, "vibration": 0.2, "rpm": 1200, "timestamp": "2025-06-01T08:00:00"}
]"#;

pub struct TestApp {
    pub state: Arc<AppState>,
    dir: PathBuf,
}

impl TestApp {
    pub fn new(store: MemoryStore, snapshots: Option<&str>) -> Self {
        let dir = std::env::temp_dir().join(format!("plantwatch-web-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(content) = snapshots {
            std::fs::write(dir.join("20250601T080000.json"), content).unwrap();
        }
        let state = AppState::new(Store::Memory(store), RealtimeSource::new(&dir));
        Self {
            state: Arc::new(state),
            dir,
        }
    }

    pub fn empty() -> Self {
        Self::new(MemoryStore::new(), None)
    }

    pub fn with_snapshots() -> Self {
        Self::new(MemoryStore::new(), Some(SNAPSHOTS))
    }

    pub fn store(&self) -> &Store {
        &self.state.store
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, text) = self.call_text(request).await;
        let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (status, value)
    }

    pub async fn call_text(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// `ApiResponse::Success` の中身
pub fn success(body: &Value) -> &Value {
    body.get("Success")
        .unwrap_or_else(|| panic!("not a success response: {body}"))
}

pub fn error_message(body: &Value) -> &str {
    body.get("Error")
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("not an error response: {body}"))
}
