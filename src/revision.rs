use crate::aggregate;
use crate::error::{GradingError, GradingResult};
use crate::gradebook::Gradebook;
use crate::model::{Role, SubmissionStatus};
use crate::store::{load_responses, load_submission, response_owner, write_aggregate};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionOutcome {
    pub success: bool,
    pub response_id: String,
    pub submission_id: String,
    pub previous_marks: Option<f64>,
    pub new_marks: f64,
    pub status: SubmissionStatus,
    pub overall_marks: Option<f64>,
}

/// Teacher override of one response's mark. The mark write, the recompute and
/// the aggregate write commit together under the submission lock, so readers
/// never see the new mark next to a stale overall.
pub fn update_mark(
    gb: &Gradebook,
    response_id: &str,
    new_mark: f64,
    actor_role: Role,
    actor_id: Option<&str>,
) -> GradingResult<RevisionOutcome> {
    if !actor_role.is_staff() {
        tracing::warn!(response_id, actor_id, "mark revision refused for student");
        return Err(GradingError::Authorization(
            "only teachers and admins may revise marks".to_string(),
        ));
    }
    if !aggregate::is_valid_mark(new_mark) {
        return Err(GradingError::validation_with(
            "marks must be between 0 and 10",
            json!({ "marks": new_mark }),
        ));
    }

    let mut conn = gb.conn()?;
    let Some(owner) = response_owner(&conn, response_id)? else {
        return Err(GradingError::NotFound("response not found".to_string()));
    };
    let submission_id = owner.submission_id;

    let outcome = gb.locks().with_submission(&submission_id, || -> GradingResult<RevisionOutcome> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(submission) = load_submission(&tx, &submission_id)? else {
            return Err(GradingError::NotFound("submission not found".to_string()));
        };
        if submission.status != SubmissionStatus::Graded {
            return Err(GradingError::State(
                "marks can only be revised once the submission is graded".to_string(),
            ));
        }

        let previous_marks: Option<f64> = tx.query_row(
            "SELECT marks FROM responses WHERE id = ?",
            [response_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "UPDATE responses SET marks = ? WHERE id = ?",
            (new_mark, response_id),
        )?;
        let responses = load_responses(&tx, &submission_id)?;
        let agg = aggregate::compute_overall(&responses);
        write_aggregate(&tx, &submission_id, &agg)?;
        tx.commit()?;

        Ok(RevisionOutcome {
            success: true,
            response_id: response_id.to_string(),
            submission_id: submission_id.clone(),
            previous_marks,
            new_marks: new_mark,
            status: agg.status,
            overall_marks: agg.overall_marks,
        })
    })?;

    tracing::info!(
        response_id,
        submission_id = %outcome.submission_id,
        actor_role = %actor_role,
        actor_id,
        from = ?outcome.previous_marks,
        to = new_mark,
        overall_marks = ?outcome.overall_marks,
        "mark revised"
    );
    Ok(outcome)
}
