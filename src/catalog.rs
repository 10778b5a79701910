//! Assignment, question, topic and class definitions. The grading core only
//! reads them through [`Catalog`]; the `catalog.*` IPC methods seed them.

use crate::db::DbPool;
use crate::error::{GradingError, GradingResult};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDef {
    pub id: String,
    pub position: i64,
    pub content: String,
    pub topic_id: Option<String>,
    pub reference_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDef {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub teacher_id: String,
    pub questions: Vec<QuestionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub id: String,
    pub title: String,
}

pub trait Catalog: Send + Sync {
    fn get_assignment(&self, assignment_id: &str) -> GradingResult<Option<AssignmentDef>>;
    fn topic_of(&self, question_id: &str) -> GradingResult<Option<String>>;
    fn teaches_class(&self, teacher_id: &str, class_id: &str) -> GradingResult<bool>;
    fn enrolled_students(&self, class_id: &str) -> GradingResult<Vec<String>>;
    /// `None` when the class itself is unknown.
    fn class_assignments(&self, class_id: &str) -> GradingResult<Option<Vec<AssignmentSummary>>>;
    fn topic_name(&self, topic_id: &str) -> GradingResult<Option<String>>;
}

pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Catalog for SqliteCatalog {
    fn get_assignment(&self, assignment_id: &str) -> GradingResult<Option<AssignmentDef>> {
        let conn = self.pool.get()?;
        let head: Option<(String, String, String)> = conn
            .query_row(
                "SELECT a.class_id, a.title, c.teacher_id
                 FROM assignments a
                 JOIN classes c ON c.id = a.class_id
                 WHERE a.id = ?",
                [assignment_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((class_id, title, teacher_id)) = head else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, position, content, topic_id, reference_answer
             FROM questions
             WHERE assignment_id = ?
             ORDER BY position",
        )?;
        let questions = stmt
            .query_map([assignment_id], |r| {
                Ok(QuestionDef {
                    id: r.get(0)?,
                    position: r.get(1)?,
                    content: r.get(2)?,
                    topic_id: r.get(3)?,
                    reference_answer: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(AssignmentDef {
            id: assignment_id.to_string(),
            class_id,
            title,
            teacher_id,
            questions,
        }))
    }

    fn topic_of(&self, question_id: &str) -> GradingResult<Option<String>> {
        let conn = self.pool.get()?;
        let topic: Option<Option<String>> = conn
            .query_row(
                "SELECT topic_id FROM questions WHERE id = ?",
                [question_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(topic.flatten())
    }

    fn teaches_class(&self, teacher_id: &str, class_id: &str) -> GradingResult<bool> {
        let conn = self.pool.get()?;
        let hit: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM classes WHERE id = ? AND teacher_id = ?",
                (class_id, teacher_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    fn enrolled_students(&self, class_id: &str) -> GradingResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT student_id FROM enrollments WHERE class_id = ? ORDER BY sort_order, student_id",
        )?;
        let ids = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn class_assignments(&self, class_id: &str) -> GradingResult<Option<Vec<AssignmentSummary>>> {
        let conn = self.pool.get()?;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT id, title FROM assignments WHERE class_id = ? ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(AssignmentSummary {
                    id: r.get(0)?,
                    title: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(rows))
    }

    fn topic_name(&self, topic_id: &str) -> GradingResult<Option<String>> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row("SELECT name FROM topics WHERE id = ?", [topic_id], |r| {
                r.get(0)
            })
            .optional()?)
    }
}

// Seeding. These run on the daemon side only; the grading core never writes
// catalog rows.

pub fn upsert_class(
    conn: &Connection,
    class_id: Option<&str>,
    name: &str,
    teacher_id: &str,
) -> GradingResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GradingError::validation("class name must not be empty"));
    }
    if teacher_id.trim().is_empty() {
        return Err(GradingError::validation("teacherId must not be empty"));
    }
    let id = class_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    conn.execute(
        "INSERT INTO classes(id, name, teacher_id) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           teacher_id = excluded.teacher_id",
        (&id, name, teacher_id.trim()),
    )?;
    Ok(id)
}

pub fn upsert_topic(
    conn: &Connection,
    topic_id: Option<&str>,
    name: &str,
    outline: Option<&str>,
) -> GradingResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GradingError::validation("topic name must not be empty"));
    }
    let id = topic_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    conn.execute(
        "INSERT INTO topics(id, name, outline) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           outline = excluded.outline",
        (&id, name, outline),
    )?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub content: String,
    pub topic_id: Option<String>,
    pub reference_answer: Option<String>,
}

/// Creates an assignment with its questions in one transaction. Question ids
/// are returned in assignment order.
pub fn create_assignment(
    conn: &Connection,
    class_id: &str,
    title: &str,
    questions: &[NewQuestion],
) -> GradingResult<(String, Vec<String>)> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GradingError::validation("assignment title must not be empty"));
    }
    if questions.is_empty() {
        return Err(GradingError::validation(
            "an assignment needs at least one question",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let class_exists: Option<i64> = tx
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if class_exists.is_none() {
        return Err(GradingError::NotFound("class not found".to_string()));
    }

    let assignment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO assignments(id, class_id, title) VALUES(?, ?, ?)",
        (&assignment_id, class_id, title),
    )?;

    let mut question_ids = Vec::with_capacity(questions.len());
    for (i, q) in questions.iter().enumerate() {
        if q.content.trim().is_empty() {
            return Err(GradingError::validation_with(
                "question content must not be empty",
                serde_json::json!({ "index": i }),
            ));
        }
        if let Some(topic_id) = q.topic_id.as_deref() {
            let topic_exists: Option<i64> = tx
                .query_row("SELECT 1 FROM topics WHERE id = ?", [topic_id], |r| r.get(0))
                .optional()?;
            if topic_exists.is_none() {
                return Err(GradingError::NotFound(format!("topic not found: {topic_id}")));
            }
        }
        let question_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO questions(id, assignment_id, position, content, topic_id, reference_answer)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &question_id,
                &assignment_id,
                i as i64,
                q.content.trim(),
                q.topic_id.as_deref(),
                q.reference_answer.as_deref(),
            ),
        )?;
        question_ids.push(question_id);
    }
    tx.commit()?;

    Ok((assignment_id, question_ids))
}

pub fn enroll_student(conn: &Connection, class_id: &str, student_id: &str) -> GradingResult<()> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(GradingError::validation("studentId must not be empty"));
    }
    let class_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if class_exists.is_none() {
        return Err(GradingError::NotFound("class not found".to_string()));
    }
    conn.execute(
        "INSERT INTO enrollments(class_id, student_id, sort_order)
         VALUES(?, ?, (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM enrollments WHERE class_id = ?))
         ON CONFLICT(class_id, student_id) DO NOTHING",
        (class_id, student_id, class_id),
    )?;
    Ok(())
}
