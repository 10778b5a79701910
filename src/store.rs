//! Submissions and their responses: creation, assessor results, review reads.

use crate::aggregate::{self, TopicFeedback};
use crate::assessor::GradingJob;
use crate::catalog::AssignmentDef;
use crate::db::now_timestamp;
use crate::error::{GradingError, GradingResult};
use crate::gradebook::Gradebook;
use crate::model::{
    Response, Review, ReviewResponse, Role, Submission, SubmissionAggregate, SubmissionStatus,
};
use crate::negotiation;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Where a response sits: its submission, that submission's owner and state.
#[derive(Debug, Clone)]
pub(crate) struct ResponseOwner {
    pub submission_id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub status: SubmissionStatus,
}

pub(crate) fn load_submission(conn: &Connection, submission_id: &str) -> GradingResult<Option<Submission>> {
    let row = conn
        .query_row(
            "SELECT id, assignment_id, student_id, status, overall_marks, overall_feedback, created_at
             FROM submissions
             WHERE id = ?",
            [submission_id],
            |r| {
                let status: String = r.get(3)?;
                Ok(Submission {
                    id: r.get(0)?,
                    assignment_id: r.get(1)?,
                    student_id: r.get(2)?,
                    status: SubmissionStatus::parse_stored(&status)?,
                    overall_marks: r.get(4)?,
                    overall_feedback: r.get(5)?,
                    created_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn load_responses(conn: &Connection, submission_id: &str) -> GradingResult<Vec<Response>> {
    let mut stmt = conn.prepare(
        "SELECT id, submission_id, question_id, position, content, marks, feedback, topic_id
         FROM responses
         WHERE submission_id = ?
         ORDER BY position",
    )?;
    let rows = stmt
        .query_map([submission_id], |r| {
            Ok(Response {
                id: r.get(0)?,
                submission_id: r.get(1)?,
                question_id: r.get(2)?,
                position: r.get(3)?,
                content: r.get(4)?,
                marks: r.get(5)?,
                feedback: r.get(6)?,
                topic_id: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn response_owner(conn: &Connection, response_id: &str) -> GradingResult<Option<ResponseOwner>> {
    let row = conn
        .query_row(
            "SELECT s.id, s.assignment_id, s.student_id, s.status
             FROM responses r
             JOIN submissions s ON s.id = r.submission_id
             WHERE r.id = ?",
            [response_id],
            |r| {
                let status: String = r.get(3)?;
                Ok(ResponseOwner {
                    submission_id: r.get(0)?,
                    assignment_id: r.get(1)?,
                    student_id: r.get(2)?,
                    status: SubmissionStatus::parse_stored(&status)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn write_aggregate(
    conn: &Connection,
    submission_id: &str,
    agg: &SubmissionAggregate,
) -> GradingResult<()> {
    conn.execute(
        "UPDATE submissions SET status = ?, overall_marks = ? WHERE id = ?",
        (agg.status.as_str(), agg.overall_marks, submission_id),
    )?;
    Ok(())
}

/// Creates the submission and one unmarked response per answer, atomically.
/// Grading jobs go out only after the commit.
pub fn submit(
    gb: &Gradebook,
    assignment_id: &str,
    student_id: &str,
    answers: &BTreeMap<String, String>,
) -> GradingResult<String> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(GradingError::validation("studentId must not be empty"));
    }

    let Some(assignment) = gb.catalog().get_assignment(assignment_id)? else {
        return Err(GradingError::NotFound("assignment not found".to_string()));
    };

    let known: HashSet<&str> = assignment.questions.iter().map(|q| q.id.as_str()).collect();
    let missing: Vec<&str> = assignment
        .questions
        .iter()
        .map(|q| q.id.as_str())
        .filter(|id| !answers.contains_key(*id))
        .collect();
    let unknown: Vec<&str> = answers
        .keys()
        .map(String::as_str)
        .filter(|id| !known.contains(id))
        .collect();
    if !missing.is_empty() || !unknown.is_empty() {
        return Err(GradingError::validation_with(
            "answers must cover every question of the assignment and nothing else",
            json!({ "missing": missing, "unknown": unknown }),
        ));
    }

    let mut topics: Vec<Option<String>> = Vec::with_capacity(assignment.questions.len());
    for q in &assignment.questions {
        topics.push(gb.catalog().topic_of(&q.id)?);
    }

    let submission_id = Uuid::new_v4().to_string();
    let created_at = now_timestamp();
    let mut jobs: Vec<GradingJob> = Vec::with_capacity(assignment.questions.len());

    let mut conn = gb.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM submissions WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(duplicate_submission(assignment_id, student_id));
    }

    if let Err(e) = tx.execute(
        "INSERT INTO submissions(id, assignment_id, student_id, status, overall_marks, overall_feedback, created_at)
         VALUES(?, ?, ?, ?, NULL, NULL, ?)",
        (
            &submission_id,
            assignment_id,
            student_id,
            SubmissionStatus::Submitted.as_str(),
            &created_at,
        ),
    ) {
        if GradingError::is_unique_violation(&e) {
            return Err(duplicate_submission(assignment_id, student_id));
        }
        return Err(e.into());
    }

    for (q, topic_id) in assignment.questions.iter().zip(topics) {
        let response_id = Uuid::new_v4().to_string();
        let answer = answers.get(&q.id).cloned().unwrap_or_default();
        tx.execute(
            "INSERT INTO responses(id, submission_id, question_id, position, content, marks, feedback, topic_id)
             VALUES(?, ?, ?, ?, ?, NULL, NULL, ?)",
            (&response_id, &submission_id, &q.id, q.position, &answer, &topic_id),
        )?;
        jobs.push(GradingJob {
            response_id,
            submission_id: submission_id.clone(),
            question_content: q.content.clone(),
            answer_content: answer,
            reference_answer: q.reference_answer.clone(),
        });
    }
    tx.commit()?;

    tracing::info!(
        submission_id = %submission_id,
        assignment_id,
        student_id,
        responses = jobs.len(),
        "submission created"
    );
    for job in jobs {
        gb.assessor().request_grading(job);
    }

    Ok(submission_id)
}

fn duplicate_submission(assignment_id: &str, student_id: &str) -> GradingError {
    tracing::info!(assignment_id, student_id, "duplicate submission refused");
    GradingError::Conflict("a submission already exists for this assignment and student".to_string())
}

pub fn get_review(
    gb: &Gradebook,
    submission_id: &str,
    viewer_id: &str,
    viewer_role: Role,
    topic_feedback: TopicFeedback,
) -> GradingResult<Review> {
    // The connection goes back to the pool before the catalog takes its own.
    let (submission, responses, threads, summaries) = {
        let conn = gb.conn()?;
        // One read transaction: marks and the aggregate come from the same snapshot.
        let tx = conn.unchecked_transaction()?;

        let Some(submission) = load_submission(&tx, submission_id)? else {
            return Err(GradingError::NotFound("submission not found".to_string()));
        };
        if viewer_role == Role::Student && viewer_id != submission.student_id {
            tracing::warn!(submission_id, viewer_id, "student tried to read another student's review");
            return Err(GradingError::Authorization(
                "students may only review their own submissions".to_string(),
            ));
        }

        let responses = load_responses(&tx, submission_id)?;
        let mut threads = Vec::with_capacity(responses.len());
        for r in &responses {
            threads.push(negotiation::comments_for(&tx, &r.id)?);
        }
        let summaries = load_topic_feedback(&tx, submission_id)?;
        (submission, responses, threads, summaries)
    };

    let assignment = gb.catalog().get_assignment(&submission.assignment_id)?;
    let question_text: HashMap<&str, &str> = assignment
        .as_ref()
        .map(|a| {
            a.questions
                .iter()
                .map(|q| (q.id.as_str(), q.content.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut topic_scores = aggregate::compute_topic_scores(&responses, topic_feedback);
    for ts in &mut topic_scores {
        if let Some(summary) = summaries.get(&ts.topic_id) {
            ts.feedback = Some(summary.clone());
        }
    }

    let responses = responses
        .into_iter()
        .zip(threads)
        .map(|(response, comments)| ReviewResponse {
            question_content: question_text
                .get(response.question_id.as_str())
                .map(|s| s.to_string()),
            response,
            comments,
        })
        .collect();

    Ok(Review {
        submission,
        assignment_title: assignment.map(|a| a.title),
        responses,
        topic_scores,
    })
}

fn load_topic_feedback(conn: &Connection, submission_id: &str) -> GradingResult<BTreeMap<String, String>> {
    let mut stmt =
        conn.prepare("SELECT topic_id, feedback FROM topic_feedback WHERE submission_id = ?")?;
    let rows = stmt
        .query_map([submission_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessorAck {
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub overall_marks: Option<f64>,
    pub remaining: usize,
}

/// First mark for a response. The last one in a submission moves it to
/// `Graded`; the check runs inside the submission lock and a write
/// transaction so concurrent callbacks cannot both miss it.
pub fn record_assessor_result(
    gb: &Gradebook,
    response_id: &str,
    marks: f64,
    feedback: Option<&str>,
) -> GradingResult<AssessorAck> {
    if !aggregate::is_valid_mark(marks) {
        return Err(GradingError::validation_with(
            "marks must be between 0 and 10",
            json!({ "marks": marks }),
        ));
    }

    let mut conn = gb.conn()?;
    let Some(owner) = response_owner(&conn, response_id)? else {
        return Err(GradingError::NotFound("response not found".to_string()));
    };

    let ack = gb.locks().with_submission(&owner.submission_id, || -> GradingResult<AssessorAck> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<f64> = tx.query_row(
            "SELECT marks FROM responses WHERE id = ?",
            [response_id],
            |r| r.get(0),
        )?;
        if current.is_some() {
            return Err(GradingError::State(
                "response already has a mark; use mark revision to change it".to_string(),
            ));
        }

        tx.execute(
            "UPDATE responses SET marks = ?, feedback = ? WHERE id = ?",
            (marks, feedback, response_id),
        )?;
        let responses = load_responses(&tx, &owner.submission_id)?;
        let agg = aggregate::lifecycle_aggregate(&responses);
        write_aggregate(&tx, &owner.submission_id, &agg)?;
        tx.commit()?;

        Ok(AssessorAck {
            submission_id: owner.submission_id.clone(),
            status: agg.status,
            overall_marks: agg.overall_marks,
            remaining: responses.iter().filter(|r| r.marks.is_none()).count(),
        })
    })?;

    tracing::info!(
        response_id,
        submission_id = %ack.submission_id,
        marks,
        remaining = ack.remaining,
        "assessor result recorded"
    );
    if ack.status == SubmissionStatus::Graded {
        tracing::info!(
            submission_id = %ack.submission_id,
            overall_marks = ?ack.overall_marks,
            "submission graded"
        );
    }
    Ok(ack)
}

/// Overall and per-topic feedback text from the assessor. Never touches marks.
pub fn record_assessor_summary(
    gb: &Gradebook,
    submission_id: &str,
    overall_feedback: Option<&str>,
    topic_feedback: &BTreeMap<String, String>,
) -> GradingResult<()> {
    let mut conn = gb.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if load_submission(&tx, submission_id)?.is_none() {
        return Err(GradingError::NotFound("submission not found".to_string()));
    }

    if let Some(text) = overall_feedback {
        tx.execute(
            "UPDATE submissions SET overall_feedback = ? WHERE id = ?",
            (text, submission_id),
        )?;
    }
    for (topic_id, text) in topic_feedback {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        tx.execute(
            "INSERT INTO topic_feedback(submission_id, topic_id, feedback) VALUES(?, ?, ?)
             ON CONFLICT(submission_id, topic_id) DO UPDATE SET feedback = excluded.feedback",
            (submission_id, topic_id, text),
        )?;
    }
    tx.commit()?;

    tracing::info!(submission_id, topics = topic_feedback.len(), "assessor summary recorded");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingState {
    NotSubmitted,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRow {
    pub student_id: String,
    pub enrolled: bool,
    pub submission_id: Option<String>,
    pub state: ListingState,
    pub submitted: bool,
    pub marks: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubmissions {
    pub assignment_id: String,
    pub title: String,
    pub submissions: Vec<SubmissionRow>,
    pub submitted_count: usize,
    pub graded_count: usize,
    pub not_submitted_count: usize,
}

/// One row per enrolled student, then any other submitter. "Not submitted",
/// "submitted but ungraded" and "graded" stay distinct.
pub fn list_for_assignment(gb: &Gradebook, assignment_id: &str) -> GradingResult<AssignmentSubmissions> {
    let Some(assignment) = gb.catalog().get_assignment(assignment_id)? else {
        return Err(GradingError::NotFound("assignment not found".to_string()));
    };
    let enrolled = gb.catalog().enrolled_students(&assignment.class_id)?;

    let conn = gb.conn()?;
    let mut stmt = conn.prepare(
        "SELECT student_id, id, status, overall_marks
         FROM submissions
         WHERE assignment_id = ?
         ORDER BY created_at, id",
    )?;
    let found = stmt
        .query_map([assignment_id], |r| {
            let status: String = r.get(2)?;
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                SubmissionStatus::parse_stored(&status)?,
                r.get::<_, Option<f64>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_student: HashMap<&str, (&str, SubmissionStatus, Option<f64>)> = HashMap::new();
    for (student, id, status, marks) in &found {
        by_student.insert(student.as_str(), (id.as_str(), *status, *marks));
    }

    let row_for = |student_id: &str, is_enrolled: bool| match by_student.get(student_id) {
        None => SubmissionRow {
            student_id: student_id.to_string(),
            enrolled: is_enrolled,
            submission_id: None,
            state: ListingState::NotSubmitted,
            submitted: false,
            marks: None,
        },
        Some((id, status, marks)) => {
            let graded = *status == SubmissionStatus::Graded;
            SubmissionRow {
                student_id: student_id.to_string(),
                enrolled: is_enrolled,
                submission_id: Some(id.to_string()),
                state: if graded {
                    ListingState::Graded
                } else {
                    ListingState::Submitted
                },
                submitted: true,
                marks: if graded { *marks } else { None },
            }
        }
    };

    let enrolled_set: HashSet<&str> = enrolled.iter().map(String::as_str).collect();
    let mut rows: Vec<SubmissionRow> = enrolled.iter().map(|s| row_for(s.as_str(), true)).collect();
    for (student, _, _, _) in &found {
        if !enrolled_set.contains(student.as_str()) {
            rows.push(row_for(student.as_str(), false));
        }
    }

    let graded_count = rows.iter().filter(|r| r.state == ListingState::Graded).count();
    let submitted_count = rows.iter().filter(|r| r.submitted).count();
    let not_submitted_count = rows.len() - submitted_count;

    Ok(AssignmentSubmissions {
        assignment_id: assignment.id,
        title: assignment.title,
        submissions: rows,
        submitted_count,
        graded_count,
        not_submitted_count,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcSummary {
    pub scanned: usize,
    pub changed: usize,
}

/// Rewrites every submission's status and overall marks from its responses.
pub fn recalc_all(gb: &Gradebook) -> GradingResult<RecalcSummary> {
    let mut conn = gb.conn()?;
    let ids: Vec<String> = {
        let mut stmt = conn.prepare("SELECT id FROM submissions ORDER BY created_at, id")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut changed = 0;
    for id in &ids {
        let did_change = gb.locks().with_submission(id, || -> GradingResult<bool> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(current) = load_submission(&tx, id)? else {
                return Ok(false);
            };
            let responses = load_responses(&tx, id)?;
            let agg = aggregate::lifecycle_aggregate(&responses);
            if agg.status == current.status && agg.overall_marks == current.overall_marks {
                return Ok(false);
            }
            write_aggregate(&tx, id, &agg)?;
            tx.commit()?;
            tracing::info!(
                submission_id = %id,
                from = ?current.overall_marks,
                to = ?agg.overall_marks,
                "aggregate corrected"
            );
            Ok(true)
        })?;
        if did_change {
            changed += 1;
        }
    }

    Ok(RecalcSummary {
        scanned: ids.len(),
        changed,
    })
}

struct UnmarkedRow {
    response_id: String,
    submission_id: String,
    assignment_id: String,
    question_id: String,
    content: String,
}

/// Hands every still-unmarked response back to the assessor. Run when a
/// workspace is opened, since jobs queued in memory do not survive it.
pub fn requeue_unmarked(gb: &Gradebook) -> GradingResult<usize> {
    let rows: Vec<UnmarkedRow> = {
        let conn = gb.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.submission_id, s.assignment_id, r.question_id, r.content
             FROM responses r
             JOIN submissions s ON s.id = r.submission_id
             WHERE r.marks IS NULL
             ORDER BY s.created_at, s.id, r.position",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(UnmarkedRow {
                    response_id: r.get(0)?,
                    submission_id: r.get(1)?,
                    assignment_id: r.get(2)?,
                    question_id: r.get(3)?,
                    content: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut assignments: HashMap<String, Option<AssignmentDef>> = HashMap::new();
    let mut requeued = 0;
    for row in rows {
        if !assignments.contains_key(&row.assignment_id) {
            let found = gb.catalog().get_assignment(&row.assignment_id)?;
            assignments.insert(row.assignment_id.clone(), found);
        }
        let question = assignments
            .get(&row.assignment_id)
            .and_then(|a| a.as_ref())
            .and_then(|a| a.questions.iter().find(|q| q.id == row.question_id));
        let Some(question) = question else {
            tracing::warn!(response_id = %row.response_id, "unmarked response has no catalog question");
            continue;
        };
        gb.assessor().request_grading(GradingJob {
            response_id: row.response_id,
            submission_id: row.submission_id,
            question_content: question.content.clone(),
            answer_content: row.content,
            reference_answer: question.reference_answer.clone(),
        });
        requeued += 1;
    }
    Ok(requeued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn submit_creates_unmarked_responses_and_queues_jobs() {
        let fx = Fixture::new("store-submit");
        let sid = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("submit");

        let conn = fx.gb.conn().expect("conn");
        let s = load_submission(&conn, &sid).expect("load").expect("exists");
        assert_eq!(s.status, SubmissionStatus::Submitted);
        assert_eq!(s.overall_marks, None);
        let rs = load_responses(&conn, &sid).expect("responses");
        assert_eq!(rs.len(), 2);
        assert!(rs.iter().all(|r| r.marks.is_none()));
        assert_eq!(rs[0].question_id, fx.question_ids[0]);
        assert_eq!(rs[0].topic_id.as_deref(), Some(fx.topic_id.as_str()));
        assert_eq!(rs[1].topic_id, None);

        let jobs = fx.queue.drain(None);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].question_content, "What is 2+2?");
        assert_eq!(jobs[0].reference_answer.as_deref(), Some("4"));
    }

    #[test]
    fn missing_answer_is_rejected_and_creates_nothing() {
        let fx = Fixture::new("store-missing");
        let mut answers = fx.answers();
        answers.remove(&fx.question_ids[1]);
        let err = submit(&fx.gb, &fx.assignment_id, "stu-1", &answers).expect_err("must fail");
        assert!(matches!(err, GradingError::Validation { .. }));

        let conn = fx.gb.conn().expect("conn");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))
            .expect("count");
        let m: i64 = conn
            .query_row("SELECT COUNT(*) FROM responses", [], |r| r.get(0))
            .expect("count");
        assert_eq!((n, m), (0, 0));
        assert_eq!(fx.queue.len(), 0);
    }

    #[test]
    fn foreign_question_id_is_rejected() {
        let fx = Fixture::new("store-foreign");
        let mut answers = fx.answers();
        answers.insert("not-a-question".to_string(), "?".to_string());
        let err = submit(&fx.gb, &fx.assignment_id, "stu-1", &answers).expect_err("must fail");
        assert_eq!(err.code(), "validation_failed");
    }

    #[test]
    fn unknown_assignment_is_not_found() {
        let fx = Fixture::new("store-unknown-assignment");
        let err = submit(&fx.gb, "nope", "stu-1", &fx.answers()).expect_err("must fail");
        assert!(matches!(err, GradingError::NotFound(_)));
    }

    #[test]
    fn second_submit_for_same_pair_conflicts() {
        let fx = Fixture::new("store-dup");
        submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("first");
        let err = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect_err("second");
        assert!(matches!(err, GradingError::Conflict(_)));
        // A different student is unaffected.
        submit(&fx.gb, &fx.assignment_id, "stu-2", &fx.answers()).expect("other student");
    }

    #[test]
    fn concurrent_duplicate_submits_yield_one_success() {
        let fx = Fixture::new("store-dup-race");
        let gb = Arc::clone(&fx.gb);
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gb = Arc::clone(&gb);
                let barrier = Arc::clone(&barrier);
                let assignment_id = fx.assignment_id.clone();
                let answers = fx.answers();
                thread::spawn(move || {
                    barrier.wait();
                    submit(&gb, &assignment_id, "stu-1", &answers)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, GradingError::Conflict(_))));
    }

    #[test]
    fn assessor_results_walk_the_lifecycle() {
        let fx = Fixture::new("store-lifecycle");
        let sid = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("submit");
        let rids = fx.response_ids(&sid);

        let ack = record_assessor_result(&fx.gb, &rids[0], 8.0, Some("good")).expect("first");
        assert_eq!(ack.status, SubmissionStatus::Grading);
        assert_eq!(ack.overall_marks, None);
        assert_eq!(ack.remaining, 1);

        let ack = record_assessor_result(&fx.gb, &rids[1], 6.0, None).expect("second");
        assert_eq!(ack.status, SubmissionStatus::Graded);
        assert_eq!(ack.overall_marks, Some(70.0));
        assert_eq!(ack.remaining, 0);

        let again = record_assessor_result(&fx.gb, &rids[1], 9.0, None).expect_err("already marked");
        assert!(matches!(again, GradingError::State(_)));
    }

    #[test]
    fn assessor_result_validates_range_and_existence() {
        let fx = Fixture::new("store-assessor-validation");
        let sid = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("submit");
        let rids = fx.response_ids(&sid);
        for bad in [-0.5, 10.5, f64::NAN] {
            let e = record_assessor_result(&fx.gb, &rids[0], bad, None).expect_err("range");
            assert!(matches!(e, GradingError::Validation { .. }));
        }
        let e = record_assessor_result(&fx.gb, "missing", 5.0, None).expect_err("missing");
        assert!(matches!(e, GradingError::NotFound(_)));
    }

    #[test]
    fn concurrent_assessor_results_grade_exactly_once() {
        let fx = Fixture::new("store-assessor-race");
        let sid = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("submit");
        let rids = fx.response_ids(&sid);
        let barrier = Arc::new(Barrier::new(rids.len()));
        let handles: Vec<_> = rids
            .iter()
            .cloned()
            .map(|rid| {
                let gb = Arc::clone(&fx.gb);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    record_assessor_result(&gb, &rid, 5.0, None).expect("record")
                })
            })
            .collect();
        let acks: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
        assert_eq!(
            acks.iter().filter(|a| a.status == SubmissionStatus::Graded).count(),
            1
        );

        let conn = fx.gb.conn().expect("conn");
        let s = load_submission(&conn, &sid).expect("load").expect("exists");
        assert_eq!(s.status, SubmissionStatus::Graded);
        assert_eq!(s.overall_marks, Some(50.0));
    }

    #[test]
    fn review_is_ordered_authorized_and_idempotent() {
        let fx = Fixture::new("store-review");
        let sid = fx.graded_submission("stu-1", &[8.0, 6.0]);

        let review = get_review(&fx.gb, &sid, "stu-1", Role::Student, TopicFeedback::Omit)
            .expect("own review");
        assert_eq!(review.submission.overall_marks, Some(70.0));
        assert_eq!(review.assignment_title.as_deref(), Some("Quiz 1"));
        assert_eq!(review.responses.len(), 2);
        assert_eq!(review.responses[0].response.position, 0);
        assert_eq!(
            review.responses[0].question_content.as_deref(),
            Some("What is 2+2?")
        );
        assert_eq!(review.topic_scores.len(), 1);
        assert_eq!(review.topic_scores[0].average_marks, 8.0);

        let again = get_review(&fx.gb, &sid, "stu-1", Role::Student, TopicFeedback::Omit)
            .expect("again");
        assert_eq!(review, again);

        let e = get_review(&fx.gb, &sid, "stu-2", Role::Student, TopicFeedback::Omit)
            .expect_err("other student");
        assert!(matches!(e, GradingError::Authorization(_)));
        get_review(&fx.gb, &sid, "anyone", Role::Teacher, TopicFeedback::Omit).expect("teacher");

        let e = get_review(&fx.gb, "missing", "stu-1", Role::Student, TopicFeedback::Omit)
            .expect_err("missing");
        assert!(matches!(e, GradingError::NotFound(_)));
    }

    #[test]
    fn assessor_summary_feeds_review() {
        let fx = Fixture::new("store-summary");
        let sid = fx.graded_submission("stu-1", &[8.0, 6.0]);
        let mut topics = BTreeMap::new();
        topics.insert(fx.topic_id.clone(), "Solid arithmetic.".to_string());
        record_assessor_summary(&fx.gb, &sid, Some("Well done overall."), &topics)
            .expect("summary");

        let review = get_review(&fx.gb, &sid, "t", Role::Admin, TopicFeedback::Omit).expect("review");
        assert_eq!(
            review.submission.overall_feedback.as_deref(),
            Some("Well done overall.")
        );
        assert_eq!(
            review.topic_scores[0].feedback.as_deref(),
            Some("Solid arithmetic.")
        );
        assert_eq!(review.submission.overall_marks, Some(70.0));

        let e = record_assessor_summary(&fx.gb, "missing", None, &BTreeMap::new())
            .expect_err("missing");
        assert!(matches!(e, GradingError::NotFound(_)));
    }

    #[test]
    fn listing_keeps_three_states_apart() {
        let fx = Fixture::new("store-listing");
        fx.enroll(&["stu-1", "stu-2", "stu-3"]);
        fx.graded_submission("stu-1", &[10.0, 5.0]);
        submit(&fx.gb, &fx.assignment_id, "stu-2", &fx.answers()).expect("ungraded");
        submit(&fx.gb, &fx.assignment_id, "walk-in", &fx.answers()).expect("not enrolled");

        let listing = list_for_assignment(&fx.gb, &fx.assignment_id).expect("listing");
        let states: Vec<(&str, ListingState, Option<f64>)> = listing
            .submissions
            .iter()
            .map(|r| (r.student_id.as_str(), r.state, r.marks))
            .collect();
        assert_eq!(
            states,
            vec![
                ("stu-1", ListingState::Graded, Some(75.0)),
                ("stu-2", ListingState::Submitted, None),
                ("stu-3", ListingState::NotSubmitted, None),
                ("walk-in", ListingState::Submitted, None),
            ]
        );
        assert!(!listing.submissions[3].enrolled);
        assert_eq!(listing.submitted_count, 3);
        assert_eq!(listing.graded_count, 1);
        assert_eq!(listing.not_submitted_count, 1);

        let e = list_for_assignment(&fx.gb, "missing").expect_err("missing");
        assert!(matches!(e, GradingError::NotFound(_)));
    }

    #[test]
    fn recalc_repairs_drifted_aggregates() {
        let fx = Fixture::new("store-recalc");
        let sid = fx.graded_submission("stu-1", &[8.0, 6.0]);
        {
            let conn = fx.gb.conn().expect("conn");
            conn.execute(
                "UPDATE submissions SET overall_marks = 12.0 WHERE id = ?",
                [&sid],
            )
            .expect("corrupt");
        }
        let summary = recalc_all(&fx.gb).expect("recalc");
        assert_eq!(summary, RecalcSummary { scanned: 1, changed: 1 });
        let again = recalc_all(&fx.gb).expect("recalc");
        assert_eq!(again.changed, 0);

        let conn = fx.gb.conn().expect("conn");
        let s = load_submission(&conn, &sid).expect("load").expect("exists");
        assert_eq!(s.overall_marks, Some(70.0));
    }

    #[test]
    fn review_needs_only_one_pooled_connection() {
        let fx = Fixture::single_connection("store-review-one-conn");
        let sid = fx.graded_submission("stu-1", &[8.0, 6.0]);

        let review = get_review(&fx.gb, &sid, "stu-1", Role::Student, TopicFeedback::Omit)
            .expect("review over a one-connection pool");
        assert_eq!(review.assignment_title.as_deref(), Some("Quiz 1"));
        assert_eq!(
            review.responses[1].question_content.as_deref(),
            Some("Explain carrying.")
        );

        let listing = list_for_assignment(&fx.gb, &fx.assignment_id).expect("listing");
        assert_eq!(listing.graded_count, 1);
    }

    #[test]
    fn requeue_hands_back_only_unmarked_responses() {
        let fx = Fixture::new("store-requeue");
        let sid = submit(&fx.gb, &fx.assignment_id, "stu-1", &fx.answers()).expect("submit");
        let lost = fx.queue.drain(None);
        assert_eq!(lost.len(), 2);

        assert_eq!(requeue_unmarked(&fx.gb).expect("requeue"), 2);
        assert_eq!(fx.queue.drain(None), lost);

        let rids = fx.response_ids(&sid);
        record_assessor_result(&fx.gb, &rids[0], 5.0, None).expect("mark");
        assert_eq!(requeue_unmarked(&fx.gb).expect("requeue"), 1);
        let jobs = fx.queue.drain(None);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].response_id, rids[1]);
        assert_eq!(jobs[0].question_content, "Explain carrying.");
        assert_eq!(jobs[0].answer_content, "answer 1");

        record_assessor_result(&fx.gb, &rids[1], 5.0, None).expect("mark");
        assert_eq!(requeue_unmarked(&fx.gb).expect("requeue"), 0);
        assert_eq!(fx.queue.len(), 0);
    }
}
