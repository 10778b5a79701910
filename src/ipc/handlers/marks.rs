use crate::ipc::helpers::{optional_str, reply, required_f64, required_role, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::revision;

fn handle_marks_revise(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let response_id = match required_str(req, "responseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new_mark = match required_f64(req, "newMark") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor_role = match required_role(req, "actorRole") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor_id = match optional_str(req, "actorId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(
        req,
        revision::update_mark(
            &ws.gradebook,
            &response_id,
            new_mark,
            actor_role,
            actor_id.as_deref(),
        ),
    )
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.revise" => Some(handle_marks_revise(state, req)),
        _ => None,
    }
}
