use crate::assessor::{Assessor, QueueAssessor};
use crate::catalog::{self, NewQuestion, SqliteCatalog};
use crate::config::Config;
use crate::db;
use crate::gradebook::Gradebook;
use crate::store;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "gradebookd-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A workspace with one class, one topic and a two-question assignment.
/// Question 0 carries the topic; question 1 has none.
pub struct Fixture {
    pub gb: Arc<Gradebook>,
    pub queue: Arc<QueueAssessor>,
    pub class_id: String,
    pub teacher_id: String,
    pub assignment_id: String,
    pub question_ids: Vec<String>,
    pub topic_id: String,
    dir: PathBuf,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        Self::with_config(
            prefix,
            Config {
                pool_size: 8,
                ..Config::default()
            },
        )
    }

    /// A pool with exactly one connection. Any path that checks out a second
    /// connection while holding the first times out after two seconds.
    pub fn single_connection(prefix: &str) -> Self {
        Self::with_config(
            prefix,
            Config {
                pool_size: 1,
                pool_timeout_ms: 2000,
                ..Config::default()
            },
        )
    }

    fn with_config(prefix: &str, cfg: Config) -> Self {
        let dir = temp_dir(prefix);
        let pool = db::open_pool(&dir, &cfg).expect("open pool");

        let teacher_id = "teacher-1".to_string();
        let (class_id, topic_id, assignment_id, question_ids) = {
            let conn = pool.get().expect("conn");
            let class_id =
                catalog::upsert_class(&conn, None, "Maths 7", &teacher_id).expect("class");
            let topic_id = catalog::upsert_topic(&conn, None, "Arithmetic", Some("Sums"))
                .expect("topic");
            let (assignment_id, question_ids) = catalog::create_assignment(
                &conn,
                &class_id,
                "Quiz 1",
                &[
                    NewQuestion {
                        content: "What is 2+2?".to_string(),
                        topic_id: Some(topic_id.clone()),
                        reference_answer: Some("4".to_string()),
                    },
                    NewQuestion {
                        content: "Explain carrying.".to_string(),
                        topic_id: None,
                        reference_answer: None,
                    },
                ],
            )
            .expect("assignment");
            (class_id, topic_id, assignment_id, question_ids)
        };

        let queue = Arc::new(QueueAssessor::new());
        let assessor: Arc<dyn Assessor> = queue.clone();
        let gb = Arc::new(Gradebook::new(
            pool.clone(),
            Arc::new(SqliteCatalog::new(pool)),
            assessor,
        ));

        Self {
            gb,
            queue,
            class_id,
            teacher_id,
            assignment_id,
            question_ids,
            topic_id,
            dir,
        }
    }

    pub fn answers(&self) -> BTreeMap<String, String> {
        self.question_ids
            .iter()
            .enumerate()
            .map(|(i, q)| (q.clone(), format!("answer {i}")))
            .collect()
    }

    pub fn response_ids(&self, submission_id: &str) -> Vec<String> {
        let conn = self.gb.conn().expect("conn");
        store::load_responses(&conn, submission_id)
            .expect("responses")
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    /// Submits for `student_id` and records one assessor mark per question.
    pub fn graded_submission(&self, student_id: &str, marks: &[f64]) -> String {
        let sid = store::submit(&self.gb, &self.assignment_id, student_id, &self.answers())
            .expect("submit");
        for (rid, m) in self.response_ids(&sid).iter().zip(marks) {
            store::record_assessor_result(&self.gb, rid, *m, None).expect("assessor result");
        }
        sid
    }

    pub fn enroll(&self, students: &[&str]) {
        let conn = self.gb.conn().expect("conn");
        for s in students {
            catalog::enroll_student(&conn, &self.class_id, s).expect("enroll");
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
