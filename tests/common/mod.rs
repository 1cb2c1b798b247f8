//! Shared fixtures: an in-process stand-in for the remote REST counter store.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const STORE_TOKEN: &str = "test-token";

/// Stored window: (count, reset as epoch millis)
pub type StoredWindow = (i64, i64);

#[derive(Default)]
pub struct FakeStore {
    pub windows: Mutex<HashMap<String, StoredWindow>>,
    pub fail_with: Option<StatusCode>,
}

impl FakeStore {
    pub fn keys(&self) -> Vec<String> {
        self.windows.lock().unwrap().keys().cloned().collect()
    }

    /// Plant a window directly, e.g. one left behind with a stale reset.
    pub fn seed(&self, key: &str, count: i64, reset: i64) {
        self.windows.lock().unwrap().insert(key.to_string(), (count, reset));
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// Evaluates the fixed window script's semantics on the store's own clock
async fn eval(
    State(store): State<Arc<FakeStore>>,
    headers: HeaderMap,
    Json(command): Json<Vec<Value>>,
) -> (StatusCode, Json<Value>) {
    if let Some(status) = store.fail_with {
        return (status, Json(json!({ "error": "store is down" })));
    }

    let authorized = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h == format!("Bearer {}", STORE_TOKEN));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })));
    }

    let arg = |i: usize| command.get(i).and_then(Value::as_str).unwrap_or_default().to_string();
    if arg(0) != "EVAL" || arg(2) != "1" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "ERR unknown command" })));
    }
    let key = arg(3);
    let max: i64 = arg(4).parse().unwrap_or(0);
    let window: i64 = arg(5).parse().unwrap_or(0);

    let now = now_millis();
    let mut windows = store.windows.lock().unwrap();
    let (count, reset) = windows.entry(key).or_insert((0, 0));
    if *reset <= now {
        *count = 1;
        *reset = now + window;
        return (StatusCode::OK, Json(json!({ "result": [1, 1, *reset] })));
    }
    if *count >= max {
        return (StatusCode::OK, Json(json!({ "result": [0, *count, *reset] })));
    }
    *count += 1;
    (StatusCode::OK, Json(json!({ "result": [1, *count, *reset] })))
}

/// Serve a fake store on an ephemeral port; returns its URL.
pub async fn spawn_store(store: Arc<FakeStore>) -> String {
    let app = Router::new().route("/", post(eval)).with_state(store);
    serve(app).await
}

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
