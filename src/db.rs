use crate::config::Config;
use anyhow::Context;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_pool(workspace: &Path, cfg: &Config) -> anyhow::Result<DbPool> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace directory {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let busy_timeout = Duration::from_millis(cfg.busy_timeout_ms);

    let manager = SqliteConnectionManager::file(&db_path).with_init(move |c| {
        c.busy_timeout(busy_timeout)?;
        c.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(())
    });
    let pool = r2d2::Pool::builder()
        .max_size(cfg.pool_size)
        .connection_timeout(Duration::from_millis(cfg.pool_timeout_ms))
        .build(manager)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;

    let conn = pool.get().context("failed to check out schema connection")?;
    // Journal mode is sticky on the file; readers then see a stable snapshot
    // while a writer holds the lock.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    ensure_schema(&conn)?;

    Ok(pool)
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    // Catalog tables. The grading core only reads these.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_id TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            outline TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            title TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            topic_id TEXT,
            reference_answer TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(topic_id) REFERENCES topics(id),
            UNIQUE(assignment_id, position)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_assignment ON questions(assignment_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    // Grading core.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            overall_marks REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    ensure_submissions_overall_feedback(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            marks REAL,
            feedback TEXT,
            topic_id TEXT,
            FOREIGN KEY(submission_id) REFERENCES submissions(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(submission_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_submission ON responses(submission_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS comments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            response_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            author_role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(response_id) REFERENCES responses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comments_response ON comments(response_id, created_at, id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topic_feedback(
            submission_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            feedback TEXT NOT NULL,
            PRIMARY KEY(submission_id, topic_id),
            FOREIGN KEY(submission_id) REFERENCES submissions(id)
        )",
        [],
    )?;

    Ok(())
}

fn ensure_submissions_overall_feedback(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "submissions", "overall_feedback")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE submissions ADD COLUMN overall_feedback TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
