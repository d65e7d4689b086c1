use serde_json::json;

use super::types::Request;
use crate::store::StoreError;

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

/// Rejections keep their SCREAMING kind as the error code so callers can
/// branch on it; storage faults get the sidecar's own code.
pub fn reply(req: &Request, res: Result<serde_json::Value, StoreError>) -> serde_json::Value {
    match res {
        Ok(result) => ok(&req.id, result),
        Err(StoreError::Rejected(r)) => err(&req.id, r.code(), r.message(), None),
        Err(StoreError::Storage(e)) => err(&req.id, "storage_failed", e.to_string(), None),
    }
}
