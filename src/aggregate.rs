//! Pure mark rollups. Nothing here touches storage.
//!
//! Marks are quantized to thousandths before summing so the same response set
//! always yields the same aggregate, whatever order the values arrive in.

use crate::model::{Response, SubmissionAggregate, SubmissionStatus, TopicScore};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const MIN_MARK: f64 = 0.0;
pub const MAX_MARK: f64 = 10.0;

const MARK_SCALE: f64 = 1000.0;

pub fn is_valid_mark(m: f64) -> bool {
    m.is_finite() && (MIN_MARK..=MAX_MARK).contains(&m)
}

fn quantize(m: f64) -> i64 {
    (m * MARK_SCALE).round() as i64
}

/// Round-half-up of `numer / denom` for non-negative operands.
fn div_round_half_up(numer: i64, denom: i64) -> i64 {
    (2 * numer + denom) / (2 * denom)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkTally {
    pub marked_count: usize,
    pub unmarked_count: usize,
    sum_quantized: i64,
}

impl MarkTally {
    /// Percentage over the marked responses, one decimal.
    pub fn percent(&self) -> Option<f64> {
        if self.marked_count == 0 {
            return None;
        }
        // percent = 10 * mean = sum_q / (100 n); tenths = sum_q / (10 n)
        let n = self.marked_count as i64;
        Some(div_round_half_up(self.sum_quantized, 10 * n) as f64 / 10.0)
    }

    /// Mean mark on the 0-10 scale, one decimal.
    pub fn mean_mark(&self) -> Option<f64> {
        if self.marked_count == 0 {
            return None;
        }
        let n = self.marked_count as i64;
        Some(div_round_half_up(self.sum_quantized, 100 * n) as f64 / 10.0)
    }
}

pub fn tally<I>(marks: I) -> MarkTally
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut t = MarkTally::default();
    for m in marks {
        match m {
            Some(v) => {
                t.marked_count += 1;
                t.sum_quantized += quantize(v);
            }
            None => t.unmarked_count += 1,
        }
    }
    t
}

/// Overall aggregate: defined only when every response carries a mark.
pub fn compute_overall(responses: &[Response]) -> SubmissionAggregate {
    let t = tally(responses.iter().map(|r| r.marks));
    if t.unmarked_count > 0 || t.marked_count == 0 {
        return SubmissionAggregate {
            status: SubmissionStatus::Grading,
            overall_marks: None,
        };
    }
    SubmissionAggregate {
        status: SubmissionStatus::Graded,
        overall_marks: t.percent(),
    }
}

/// Lifecycle status for a partially graded submission. Nothing marked yet is
/// still `Submitted`; any mark moves it to `Grading`; all marks to `Graded`.
pub fn lifecycle_aggregate(responses: &[Response]) -> SubmissionAggregate {
    let agg = compute_overall(responses);
    if agg.status == SubmissionStatus::Grading && responses.iter().all(|r| r.marks.is_none()) {
        return SubmissionAggregate {
            status: SubmissionStatus::Submitted,
            overall_marks: None,
        };
    }
    agg
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicFeedback {
    #[default]
    Omit,
    ConcatenateResponses,
}

pub fn compute_topic_scores(responses: &[Response], feedback: TopicFeedback) -> Vec<TopicScore> {
    let mut groups: BTreeMap<&str, Vec<&Response>> = BTreeMap::new();
    for r in responses {
        let Some(topic) = r.topic_id.as_deref() else {
            continue;
        };
        groups.entry(topic).or_default().push(r);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (topic_id, mut members) in groups {
        members.sort_by_key(|r| r.position);
        let t = tally(members.iter().map(|r| r.marks));
        let Some(average_marks) = t.mean_mark() else {
            continue;
        };
        let feedback = match feedback {
            TopicFeedback::Omit => None,
            TopicFeedback::ConcatenateResponses => {
                let parts: Vec<&str> = members
                    .iter()
                    .filter_map(|r| r.feedback.as_deref())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
        };
        out.push(TopicScore {
            topic_id: topic_id.to_string(),
            average_marks,
            response_count: t.marked_count,
            feedback,
        });
    }
    out
}

/// Mean of percentages that are already rounded to one decimal.
pub fn mean_of_percents(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum_tenths: i64 = values.iter().map(|v| (v * 10.0).round() as i64).sum();
    let n = values.len() as i64;
    Some(div_round_half_up(sum_tenths, n) as f64 / 10.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicRanking {
    pub top: Vec<TopicScore>,
    pub lowest: Vec<TopicScore>,
}

/// Best three topics (descending) and weakest three (ascending).
pub fn rank_topics(mut scores: Vec<TopicScore>) -> TopicRanking {
    scores.sort_by(|a, b| {
        b.average_marks
            .partial_cmp(&a.average_marks)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    let top: Vec<TopicScore> = scores.iter().take(3).cloned().collect();
    let lowest: Vec<TopicScore> = scores.iter().rev().take(3).cloned().collect();
    TopicRanking { top, lowest }
}
