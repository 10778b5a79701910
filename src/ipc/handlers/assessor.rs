use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::helpers::{optional_str, reply, required_f64, required_str, string_map, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_assessor_pending(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match req.params.get("limit") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_u64() {
            Some(n) => Some(n as usize),
            None => {
                return err(&req.id, "bad_params", "limit must be a non-negative integer", None)
            }
        },
    };
    let jobs = ws.queue.drain(limit);
    ok(
        &req.id,
        json!({ "jobs": jobs, "remaining": ws.queue.len() }),
    )
}

fn handle_assessor_result(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let response_id = match required_str(req, "responseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marks = match required_f64(req, "marks") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feedback = match optional_str(req, "feedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(
        req,
        store::record_assessor_result(&ws.gradebook, &response_id, marks, feedback.as_deref()),
    )
}

fn handle_assessor_summary(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let submission_id = match required_str(req, "submissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let overall = match optional_str(req, "overallFeedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topics = match string_map(req, "topicFeedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::record_assessor_summary(&ws.gradebook, &submission_id, overall.as_deref(), &topics) {
        Ok(()) => ok(&req.id, json!({ "submissionId": submission_id })),
        Err(e) => grading_err(&req.id, &e),
    }
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessor.pending" => Some(handle_assessor_pending(state, req)),
        "assessor.result" => Some(handle_assessor_result(state, req)),
        "assessor.summary" => Some(handle_assessor_summary(state, req)),
        _ => None,
    }
}
