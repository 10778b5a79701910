//! Class and student rollups over graded submissions only. A submission that
//! is still being graded contributes nothing here.

use crate::aggregate::{self, TopicFeedback};
use crate::error::{GradingError, GradingResult};
use crate::gradebook::Gradebook;
use crate::model::{Response, Role, SubmissionStatus, TopicScore};
use crate::store;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStat {
    pub assignment_id: String,
    pub title: String,
    pub average_marks: Option<f64>,
    pub submitted_count: usize,
    pub graded_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedTopicScore {
    pub topic_id: String,
    pub topic_name: Option<String>,
    pub average_marks: f64,
    pub response_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub class_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub overall_average: Option<f64>,
    pub assignments: Vec<AssignmentStat>,
    pub top_topics: Vec<NamedTopicScore>,
    pub lowest_topics: Vec<NamedTopicScore>,
}

pub fn class_stats(gb: &Gradebook, class_id: &str) -> GradingResult<PerformanceStats> {
    compute(gb, class_id, None)
}

pub fn student_stats(
    gb: &Gradebook,
    class_id: &str,
    student_id: &str,
    viewer_id: &str,
    viewer_role: Role,
) -> GradingResult<PerformanceStats> {
    if viewer_role == Role::Student && viewer_id != student_id {
        tracing::warn!(class_id, student_id, viewer_id, "student tried to read another student's stats");
        return Err(GradingError::Authorization(
            "students may only read their own statistics".to_string(),
        ));
    }
    compute(gb, class_id, Some(student_id))
}

struct SubmissionRow {
    id: String,
    assignment_id: String,
    status: String,
    overall_marks: Option<f64>,
}

fn compute(gb: &Gradebook, class_id: &str, student_id: Option<&str>) -> GradingResult<PerformanceStats> {
    let Some(assignments) = gb.catalog().class_assignments(class_id)? else {
        return Err(GradingError::NotFound("class not found".to_string()));
    };

    let empty = PerformanceStats {
        class_id: class_id.to_string(),
        student_id: student_id.map(str::to_string),
        overall_average: None,
        assignments: Vec::new(),
        top_topics: Vec::new(),
        lowest_topics: Vec::new(),
    };
    if assignments.is_empty() {
        return Ok(empty);
    }

    // Topic names come from the catalog, so the connection is released first.
    let (submissions, graded_responses) = {
        let conn = gb.conn()?;
        let tx = conn.unchecked_transaction()?;

        let placeholders = std::iter::repeat_n("?", assignments.len())
            .collect::<Vec<_>>()
            .join(",");
        let mut bind_values: Vec<Value> = assignments
            .iter()
            .map(|a| Value::Text(a.id.clone()))
            .collect();
        let mut sql = format!(
            "SELECT id, assignment_id, status, overall_marks
             FROM submissions
             WHERE assignment_id IN ({})",
            placeholders
        );
        if let Some(sid) = student_id {
            sql.push_str(" AND student_id = ?");
            bind_values.push(Value::Text(sid.to_string()));
        }
        sql.push_str(" ORDER BY created_at, id");

        let submissions: Vec<SubmissionRow> = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(bind_values), |r| {
                    Ok(SubmissionRow {
                        id: r.get(0)?,
                        assignment_id: r.get(1)?,
                        status: r.get(2)?,
                        overall_marks: r.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut graded_responses: Vec<Response> = Vec::new();
        for s in &submissions {
            if s.status == SubmissionStatus::Graded.as_str() {
                graded_responses.extend(store::load_responses(&tx, &s.id)?);
            }
        }
        (submissions, graded_responses)
    };

    let graded: Vec<&SubmissionRow> = submissions
        .iter()
        .filter(|s| s.status == SubmissionStatus::Graded.as_str())
        .collect();

    let mut per_assignment: HashMap<&str, (usize, Vec<f64>)> = HashMap::new();
    for s in &submissions {
        let entry = per_assignment.entry(s.assignment_id.as_str()).or_default();
        entry.0 += 1;
        if s.status == SubmissionStatus::Graded.as_str() {
            if let Some(m) = s.overall_marks {
                entry.1.push(m);
            }
        }
    }

    let assignment_stats: Vec<AssignmentStat> = assignments
        .iter()
        .map(|a| {
            let (submitted_count, marks) = per_assignment
                .get(a.id.as_str())
                .cloned()
                .unwrap_or_default();
            AssignmentStat {
                assignment_id: a.id.clone(),
                title: a.title.clone(),
                average_marks: aggregate::mean_of_percents(&marks),
                submitted_count,
                graded_count: marks.len(),
            }
        })
        .collect();

    let all_marks: Vec<f64> = graded.iter().filter_map(|s| s.overall_marks).collect();
    let ranking = aggregate::rank_topics(aggregate::compute_topic_scores(
        &graded_responses,
        TopicFeedback::Omit,
    ));

    let mut names: HashMap<String, Option<String>> = HashMap::new();
    let mut named = |scores: Vec<TopicScore>| -> GradingResult<Vec<NamedTopicScore>> {
        let mut out = Vec::with_capacity(scores.len());
        for ts in scores {
            let topic_name = match names.get(&ts.topic_id) {
                Some(n) => n.clone(),
                None => {
                    let n = gb.catalog().topic_name(&ts.topic_id)?;
                    names.insert(ts.topic_id.clone(), n.clone());
                    n
                }
            };
            out.push(NamedTopicScore {
                topic_id: ts.topic_id,
                topic_name,
                average_marks: ts.average_marks,
                response_count: ts.response_count,
            });
        }
        Ok(out)
    };
    let top_topics = named(ranking.top)?;
    let lowest_topics = named(ranking.lowest)?;

    Ok(PerformanceStats {
        overall_average: aggregate::mean_of_percents(&all_marks),
        assignments: assignment_stats,
        top_topics,
        lowest_topics,
        ..empty
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[test]
    fn class_stats_cover_graded_work_only() {
        let fx = Fixture::new("stats-class");
        fx.graded_submission("stu-1", &[8.0, 6.0]);
        fx.graded_submission("stu-2", &[10.0, 10.0]);
        store::submit(&fx.gb, &fx.assignment_id, "stu-3", &fx.answers()).expect("ungraded");

        let stats = class_stats(&fx.gb, &fx.class_id).expect("stats");
        assert_eq!(stats.overall_average, Some(85.0));
        assert_eq!(stats.assignments.len(), 1);
        assert_eq!(stats.assignments[0].submitted_count, 3);
        assert_eq!(stats.assignments[0].graded_count, 2);
        assert_eq!(stats.assignments[0].average_marks, Some(85.0));
        assert_eq!(stats.top_topics.len(), 1);
        assert_eq!(stats.top_topics[0].topic_name.as_deref(), Some("Arithmetic"));
        assert_eq!(stats.top_topics[0].average_marks, 9.0);
        assert_eq!(stats.top_topics[0].response_count, 2);
    }

    #[test]
    fn stats_need_only_one_pooled_connection() {
        let fx = Fixture::single_connection("stats-one-conn");
        fx.graded_submission("stu-1", &[8.0, 6.0]);

        let stats = class_stats(&fx.gb, &fx.class_id).expect("stats over a one-connection pool");
        assert_eq!(stats.overall_average, Some(70.0));
        assert_eq!(stats.lowest_topics[0].topic_name.as_deref(), Some("Arithmetic"));
    }

    #[test]
    fn student_stats_are_private_to_the_student() {
        let fx = Fixture::new("stats-student");
        fx.graded_submission("stu-1", &[8.0, 6.0]);
        fx.graded_submission("stu-2", &[10.0, 10.0]);

        let mine = student_stats(&fx.gb, &fx.class_id, "stu-1", "stu-1", Role::Student)
            .expect("own stats");
        assert_eq!(mine.overall_average, Some(70.0));
        assert_eq!(mine.student_id.as_deref(), Some("stu-1"));

        let e = student_stats(&fx.gb, &fx.class_id, "stu-1", "stu-2", Role::Student)
            .expect_err("other student");
        assert!(matches!(e, GradingError::Authorization(_)));
        student_stats(&fx.gb, &fx.class_id, "stu-1", &fx.teacher_id, Role::Teacher)
            .expect("teacher view");
    }

    #[test]
    fn unknown_class_is_not_found() {
        let fx = Fixture::new("stats-missing");
        let e = class_stats(&fx.gb, "missing").expect_err("missing");
        assert!(matches!(e, GradingError::NotFound(_)));
    }
}
