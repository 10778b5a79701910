use crate::catalog::{self, NewQuestion};
use crate::error::GradingError;
use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::helpers::{conn, optional_str, reply, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classes_upsert(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match optional_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match conn(&ws, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match catalog::upsert_class(&conn, class_id.as_deref(), &name, &teacher_id) {
        Ok(id) => ok(&req.id, json!({ "classId": id })),
        Err(e) => grading_err(&req.id, &e),
    }
}

fn handle_topics_upsert(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (topic_id, outline) = match (optional_str(req, "topicId"), optional_str(req, "outline")) {
        (Ok(t), Ok(o)) => (t, o),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let conn = match conn(&ws, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match catalog::upsert_topic(&conn, topic_id.as_deref(), &name, outline.as_deref()) {
        Ok(id) => ok(&req.id, json!({ "topicId": id })),
        Err(e) => grading_err(&req.id, &e),
    }
}

fn parse_questions(req: &Request) -> Result<Vec<NewQuestion>, serde_json::Value> {
    let Some(items) = req.params.get("questions").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing questions", None));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(content) = item.get("content").and_then(|v| v.as_str()) else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("questions[{}].content must be a string", i),
                None,
            ));
        };
        let text = |key: &str| {
            item.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        out.push(NewQuestion {
            content: content.to_string(),
            topic_id: text("topicId"),
            reference_answer: text("referenceAnswer"),
        });
    }
    Ok(out)
}

fn handle_assignments_create(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let questions = match parse_questions(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match conn(&ws, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match catalog::create_assignment(&conn, &class_id, &title, &questions) {
        Ok((assignment_id, question_ids)) => ok(
            &req.id,
            json!({ "assignmentId": assignment_id, "questionIds": question_ids }),
        ),
        Err(e) => grading_err(&req.id, &e),
    }
}

fn handle_assignments_get(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let found = ws
        .gradebook
        .catalog()
        .get_assignment(&assignment_id)
        .and_then(|a| a.ok_or_else(|| GradingError::NotFound("assignment not found".to_string())));
    reply(req, found)
}

fn handle_enrollments_add(state: &AppState, req: &Request) -> serde_json::Value {
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
    let conn = match conn(&ws, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match catalog::enroll_student(&conn, &class_id, &student_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => grading_err(&req.id, &e),
    }
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.classes.upsert" => Some(handle_classes_upsert(state, req)),
        "catalog.topics.upsert" => Some(handle_topics_upsert(state, req)),
        "catalog.assignments.create" => Some(handle_assignments_create(state, req)),
        "catalog.assignments.get" => Some(handle_assignments_get(state, req)),
        "catalog.enrollments.add" => Some(handle_enrollments_add(state, req)),
        _ => None,
    }
}
