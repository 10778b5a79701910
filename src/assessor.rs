use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One response waiting for its first mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingJob {
    pub response_id: String,
    pub submission_id: String,
    pub question_content: String,
    pub answer_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
}

/// External grader. Requests are fire-and-forget; results come back through
/// `record_assessor_result`.
pub trait Assessor: Send + Sync {
    fn request_grading(&self, job: GradingJob);
}

/// Holds jobs until the grader drains them over IPC.
#[derive(Default)]
pub struct QueueAssessor {
    jobs: Mutex<VecDeque<GradingJob>>,
}

impl QueueAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self, limit: Option<usize>) -> Vec<GradingJob> {
        let mut jobs = match self.jobs.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = limit.unwrap_or(jobs.len()).min(jobs.len());
        jobs.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        match self.jobs.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Assessor for QueueAssessor {
    fn request_grading(&self, job: GradingJob) {
        tracing::debug!(response_id = %job.response_id, "queued grading job");
        let mut jobs = match self.jobs.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.push_back(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> GradingJob {
        GradingJob {
            response_id: id.to_string(),
            submission_id: "s".to_string(),
            question_content: "q".to_string(),
            answer_content: "a".to_string(),
            reference_answer: None,
        }
    }

    #[test]
    fn drains_in_fifo_order_with_limit() {
        let q = QueueAssessor::new();
        q.request_grading(job("r1"));
        q.request_grading(job("r2"));
        q.request_grading(job("r3"));

        let first = q.drain(Some(2));
        assert_eq!(
            first.iter().map(|j| j.response_id.as_str()).collect::<Vec<_>>(),
            vec!["r1", "r2"]
        );
        assert_eq!(q.len(), 1);
        let rest = q.drain(None);
        assert_eq!(rest[0].response_id, "r3");
        assert!(q.drain(Some(10)).is_empty());
    }
}
