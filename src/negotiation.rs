//! Append-only comment threads on graded responses. Comments never touch
//! marks or aggregates, and there is no edit or delete.

use crate::db::now_timestamp;
use crate::error::{GradingError, GradingResult};
use crate::gradebook::Gradebook;
use crate::model::{Comment, Role, SubmissionStatus};
use crate::store::response_owner;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

pub(crate) fn comments_for(conn: &Connection, response_id: &str) -> GradingResult<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT id, response_id, author_id, author_role, content, created_at
         FROM comments
         WHERE response_id = ?
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([response_id], |r| {
            let role: String = r.get(3)?;
            Ok(Comment {
                id: r.get(0)?,
                response_id: r.get(1)?,
                author_id: r.get(2)?,
                author_role: Role::parse_stored(&role)?,
                content: r.get(4)?,
                created_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn add_comment(
    gb: &Gradebook,
    response_id: &str,
    author_id: &str,
    author_role: Role,
    content: &str,
) -> GradingResult<Comment> {
    let content = content.trim();
    if content.is_empty() {
        return Err(GradingError::validation("comment must not be empty"));
    }

    // Released before the catalog checks, which take their own connection.
    let owner = {
        let conn = gb.conn()?;
        response_owner(&conn, response_id)?
    };
    let Some(owner) = owner else {
        return Err(GradingError::NotFound("response not found".to_string()));
    };

    match author_role {
        Role::Student if author_id != owner.student_id => {
            tracing::warn!(response_id, author_id, "comment refused: not the submitting student");
            return Err(GradingError::Authorization(
                "students may only comment on their own responses".to_string(),
            ));
        }
        Role::Teacher => {
            let class_id = gb
                .catalog()
                .get_assignment(&owner.assignment_id)?
                .map(|a| a.class_id);
            let owns = match class_id {
                Some(class_id) => gb.catalog().teaches_class(author_id, &class_id)?,
                None => false,
            };
            if !owns {
                tracing::warn!(response_id, author_id, "comment refused: teacher does not own class");
                return Err(GradingError::Authorization(
                    "teachers may only comment on assignments of their own classes".to_string(),
                ));
            }
        }
        _ => {}
    }

    if owner.status != SubmissionStatus::Graded {
        return Err(GradingError::State(
            "comments open once the submission is graded".to_string(),
        ));
    }

    let mut conn = gb.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Never stamp a comment earlier than the thread's last one, so a clock
    // step backwards cannot reorder the thread.
    let mut created_at = now_timestamp();
    let last: Option<String> = tx
        .query_row(
            "SELECT MAX(created_at) FROM comments WHERE response_id = ?",
            [response_id],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    if let Some(last) = last {
        if last > created_at {
            created_at = last;
        }
    }
    tx.execute(
        "INSERT INTO comments(response_id, author_id, author_role, content, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (response_id, author_id, author_role.as_str(), content, &created_at),
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    tracing::info!(response_id, comment_id = id, author_role = %author_role, "comment added");
    Ok(Comment {
        id,
        response_id: response_id.to_string(),
        author_id: author_id.to_string(),
        author_role,
        content: content.to_string(),
        created_at,
    })
}

pub fn list_comments(gb: &Gradebook, response_id: &str) -> GradingResult<Vec<Comment>> {
    let conn = gb.conn()?;
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM responses WHERE id = ?", [response_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(GradingError::NotFound("response not found".to_string()));
    }
    comments_for(&conn, response_id)
}
