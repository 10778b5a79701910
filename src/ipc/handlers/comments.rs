use crate::ipc::error::{grading_err, ok};
use crate::ipc::helpers::{reply, required_role, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::negotiation;
use serde_json::json;

fn handle_comments_add(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let response_id = match required_str(req, "responseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let author_id = match required_str(req, "authorId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let author_role = match required_role(req, "authorRole") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Blank content is a domain validation failure, not a malformed request.
    let content = req
        .params
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    reply(
        req,
        negotiation::add_comment(&ws.gradebook, &response_id, &author_id, author_role, content),
    )
}

fn handle_comments_list(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let response_id = match required_str(req, "responseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match negotiation::list_comments(&ws.gradebook, &response_id) {
        Ok(comments) => ok(&req.id, json!({ "comments": comments })),
        Err(e) => grading_err(&req.id, &e),
    }
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "comments.add" => Some(handle_comments_add(state, req)),
        "comments.list" => Some(handle_comments_list(state, req)),
        _ => None,
    }
}
