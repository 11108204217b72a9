//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
};
use parley_gateway::{BackendConfig, BackendMode, Completion, ConversationStore};
use serde_json::Value;
use tokio::net::TcpListener;

/// A store rooted in a fresh temp directory (keep the guard alive)
pub fn temp_store() -> (tempfile::TempDir, ConversationStore) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = ConversationStore::new(dir.path().join("history"));
    (dir, store)
}

/// Completion stub that records prompts and answers with a fixed reply
#[derive(Clone, Default)]
pub struct StubModel {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for StubModel {
    async fn complete(&self, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// One request captured by a stub backend
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Requests captured by a stub backend
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<RecordedRequest>>>);

impl Recorded {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Start a backend on 127.0.0.1 that answers every POST with `status` and a
/// raw `body`, returning its base URL
pub async fn spawn_backend(status: StatusCode, body: impl Into<String>) -> (String, Recorded) {
    let body = body.into();
    let recorded = Recorded::default();
    let sink = recorded.clone();

    let app = Router::new().fallback(move |uri: axum::http::Uri, headers: HeaderMap, payload: String| {
        let body = body.clone();
        let sink = sink.clone();
        async move {
            sink.0.lock().unwrap().push(RecordedRequest {
                path: uri.path().to_string(),
                headers,
                body: serde_json::from_str(&payload).unwrap_or(Value::Null),
            });
            (status, [(header::CONTENT_TYPE, "application/json")], body)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), recorded)
}

/// Start a backend that answers 200 with a JSON value
pub async fn spawn_json_backend(response: Value) -> (String, Recorded) {
    spawn_backend(StatusCode::OK, response.to_string()).await
}

/// Start a backend that accepts requests but answers only after `delay`
pub async fn spawn_slow_backend(delay: Duration, response: Value) -> (String, Recorded) {
    let body = response.to_string();
    let recorded = Recorded::default();
    let sink = recorded.clone();

    let app = Router::new().fallback(move |uri: axum::http::Uri, headers: HeaderMap, payload: String| {
        let body = body.clone();
        let sink = sink.clone();
        async move {
            sink.0.lock().unwrap().push(RecordedRequest {
                path: uri.path().to_string(),
                headers,
                body: serde_json::from_str(&payload).unwrap_or(Value::Null),
            });
            tokio::time::sleep(delay).await;
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), recorded)
}

/// An address nothing is listening on
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Backend config pointing at test servers
pub fn backend_config(mode: BackendMode, local: &str, remote: &str) -> BackendConfig {
    BackendConfig {
        mode,
        address: local.to_string(),
        endpoint_path: "/api/v1".to_string(),
        remote_address: format!("{remote}/chat/completions"),
        model: Some("test-model".to_string()),
        authorization: Some("Bearer test-token".to_string()),
        stop_sequence: None,
        timeout: Duration::from_secs(5),
        ..BackendConfig::default()
    }
}

/// Chat-completion response body
pub fn chat_response(content: &str) -> Value {
    serde_json::json!({
        "id": "gen-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}
