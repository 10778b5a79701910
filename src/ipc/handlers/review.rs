use crate::aggregate::TopicFeedback;
use crate::ipc::helpers::{optional_bool, reply, required_role, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn handle_review_get(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let submission_id = match required_str(req, "submissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let viewer_id = match required_str(req, "viewerId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let viewer_role = match required_role(req, "viewerRole") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feedback = match optional_bool(req, "concatResponseFeedback") {
        Ok(true) => TopicFeedback::ConcatenateResponses,
        Ok(false) => TopicFeedback::Omit,
        Err(e) => return e,
    };

    reply(
        req,
        store::get_review(&ws.gradebook, &submission_id, &viewer_id, viewer_role, feedback),
    )
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "review.get" => Some(handle_review_get(state, req)),
        _ => None,
    }
}
