use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::db::PooledConn;
use crate::error::GradingResult;
use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::Role;

pub fn workspace(state: &AppState, req: &Request) -> Result<Arc<Workspace>, JsonValue> {
    state
        .workspace()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent and `null` both mean "not given"; any other non-string is an error.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be string or null", key), None)),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing numeric {}", key), None))
}

pub fn optional_bool(req: &Request, key: &str) -> Result<bool, JsonValue> {
    match req.params.get(key) {
        None => Ok(false),
        Some(v) if v.is_null() => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None)),
    }
}

/// Roles are part of the domain contract, so an unknown one is a validation
/// failure rather than a malformed request.
pub fn required_role(req: &Request, key: &str) -> Result<Role, JsonValue> {
    let raw = required_str(req, key)?;
    raw.parse::<Role>()
        .map_err(|e| err(&req.id, e.code(), e.to_string(), e.details()))
}

/// Reads `{key: {string: string}}`. Missing or `null` gives an empty map.
pub fn string_map(req: &Request, key: &str) -> Result<BTreeMap<String, String>, JsonValue> {
    let mut out = BTreeMap::new();
    let obj = match req.params.get(key) {
        None => return Ok(out),
        Some(v) if v.is_null() => return Ok(out),
        Some(v) => v
            .as_object()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an object", key), None))?,
    };
    for (k, v) in obj {
        let Some(text) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("{}.{} must be a string", key, k),
                None,
            ));
        };
        out.insert(k.clone(), text.to_string());
    }
    Ok(out)
}

pub fn conn(ws: &Workspace, req: &Request) -> Result<PooledConn, JsonValue> {
    ws.gradebook.conn().map_err(|e| grading_err(&req.id, &e))
}

/// Serializes a domain result into an `ok` reply.
pub fn reply<T: Serialize>(req: &Request, result: GradingResult<T>) -> JsonValue {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => grading_err(&req.id, &e),
    }
}
