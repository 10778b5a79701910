use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn requests_before_workspace_select_report_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "comments.list",
        json!({ "responseId": "r1" }),
    );
    assert_eq!(error_code(&resp), Some("no_workspace"));

    let resp = request(&mut stdin, &mut reader, "3", "workspace.select", json!({}));
    assert_eq!(error_code(&resp), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_and_unknown_methods_get_error_replies() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(error_code(&value), Some("bad_json"));

    writeln!(
        stdin,
        "{}",
        json!({ "id": "x", "method": "grades.delete", "params": {} })
    )
    .expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["id"], "x");
    assert_eq!(error_code(&value), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], true);
    assert!(workspace.join("gradebook.sqlite3").is_file());

    let class = request(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.classes.upsert",
        json!({ "name": "Smoke Class", "teacherId": "t-1" }),
    );
    let class_id = class["result"]["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let topic = request(
        &mut stdin,
        &mut reader,
        "3",
        "catalog.topics.upsert",
        json!({ "name": "Fractions" }),
    );
    let topic_id = topic["result"]["topicId"]
        .as_str()
        .expect("topicId")
        .to_string();
    let assignment = request(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.assignments.create",
        json!({
            "classId": class_id,
            "title": "Smoke Quiz",
            "questions": [{ "content": "1/2 + 1/4?", "topicId": topic_id }]
        }),
    );
    let assignment_id = assignment["result"]["assignmentId"]
        .as_str()
        .expect("assignmentId")
        .to_string();
    let question_id = assignment["result"]["questionIds"][0]
        .as_str()
        .expect("questionId")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "catalog.assignments.get",
        json!({ "assignmentId": assignment_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "catalog.enrollments.add",
        json!({ "classId": class_id, "studentId": "s-1" }),
    );
    let mut answers = serde_json::Map::new();
    answers.insert(question_id, json!("3/4"));
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "submissions.create",
        json!({
            "assignmentId": assignment_id,
            "studentId": "s-1",
            "answers": answers
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "submissions.listForAssignment",
        json!({ "assignmentId": assignment_id }),
    );
    let pending = request(&mut stdin, &mut reader, "9", "assessor.pending", json!({}));
    let response_id = pending["result"]["jobs"][0]["responseId"]
        .as_str()
        .expect("responseId")
        .to_string();
    let submission_id = pending["result"]["jobs"][0]["submissionId"]
        .as_str()
        .expect("submissionId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "assessor.result",
        json!({ "responseId": response_id, "marks": 7.5, "feedback": "close" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "assessor.summary",
        json!({ "submissionId": submission_id, "overallFeedback": "ok" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "review.get",
        json!({ "submissionId": submission_id, "viewerId": "s-1", "viewerRole": "student" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "marks.revise",
        json!({ "responseId": response_id, "newMark": 8, "actorRole": "teacher" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "comments.add",
        json!({
            "responseId": response_id,
            "authorId": "s-1",
            "authorRole": "student",
            "content": "thanks"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "comments.list",
        json!({ "responseId": response_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "stats.class",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "stats.student",
        json!({
            "classId": class_id,
            "studentId": "s-1",
            "viewerId": "s-1",
            "viewerRole": "student"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "maintenance.recalcAggregates",
        json!({}),
    );
    let health = request(&mut stdin, &mut reader, "19", "health", json!({}));
    assert_eq!(
        health["result"]["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
