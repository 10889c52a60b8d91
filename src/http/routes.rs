//! JSON endpoints. Every response carries the `{success: bool, …}`
//! envelope.

use super::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.collector.status_snapshot().await;
    let mut value = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
    if let Some(object) = value.as_object_mut() {
        object.insert("success".to_string(), json!(true));
    }
    Json(value)
}

/// `POST /api/do` — the only action is `scan`, which returns immediately.
pub async fn do_action(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match body.get("action").and_then(Value::as_str) {
        Some("scan") => {
            state.collector.request_scan();
            (
                StatusCode::OK,
                Json(json!({"success": true, "message": "Scan initiated"})),
            )
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "Invalid action"})),
        ),
    }
}

/// `GET /api/history` — the rolling history pivoted per serial.
pub async fn history(State(state): State<AppState>) -> Json<Value> {
    let history = state.collector.history_by_serial().await;
    Json(json!({"success": true, "history": history}))
}
