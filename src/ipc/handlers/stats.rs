use crate::ipc::helpers::{reply, required_role, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::stats;

fn handle_stats_class(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, stats::class_stats(&ws.gradebook, &class_id))
}

fn handle_stats_student(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
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
    reply(
        req,
        stats::student_stats(&ws.gradebook, &class_id, &student_id, &viewer_id, viewer_role),
    )
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.class" => Some(handle_stats_class(state, req)),
        "stats.student" => Some(handle_stats_student(state, req)),
        _ => None,
    }
}
