use serde_json::json;

use crate::error::GradingError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error reply for a domain failure. Storage and pool failures are logged
/// here; the rest are expected outcomes and only reach the caller.
pub fn grading_err(id: &str, e: &GradingError) -> serde_json::Value {
    match e {
        GradingError::Storage(_) | GradingError::Pool(_) => {
            tracing::error!(request_id = id, code = e.code(), error = %e, "storage failure");
        }
        _ => {
            tracing::debug!(request_id = id, code = e.code(), error = %e, "request refused");
        }
    }
    err(id, e.code(), e.to_string(), e.details())
}
