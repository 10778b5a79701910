use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::helpers::{reply, required_str, string_map, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_submissions_create(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req.params.get("answers").map(|v| v.is_object()) != Some(true) {
        return err(&req.id, "bad_params", "missing answers", None);
    }
    let answers = match string_map(req, "answers") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::submit(&ws.gradebook, &assignment_id, &student_id, &answers) {
        Ok(submission_id) => ok(&req.id, json!({ "submissionId": submission_id })),
        Err(e) => grading_err(&req.id, &e),
    }
}

fn handle_submissions_list_for_assignment(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, store::list_for_assignment(&ws.gradebook, &assignment_id))
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.create" => Some(handle_submissions_create(state, req)),
        "submissions.listForAssignment" => Some(handle_submissions_list_for_assignment(state, req)),
        _ => None,
    }
}
