use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Wraps a payload in the `{success: true, data}` envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data
    }))
}
