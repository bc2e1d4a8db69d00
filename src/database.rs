use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};

use crate::create_timestamp;
use crate::routes::{Status, Submission, SubmissionSnapshot, Verdict};

const DATABASE_NAME: &str = "gavel.sqlite3";

/// A problem with its test cases eagerly loaded, exactly as the judging task
/// needs it. Read-only from the judging core's perspective.
#[derive(Debug, Clone)]
pub struct Problem {
    pub id: i64,
    pub contest_id: i64,
    pub title: String,
    pub time_limit_secs: Option<i64>,
    pub memory_limit_mb: Option<i64>,
    pub cases: Vec<TestCase>,
}

/// One (input, expected output) pair. Order matters: evaluation proceeds in
/// definition order because early-exit depends on it.
#[derive(Debug, Clone, FromRow)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "gavel").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0) // Allow pool to shrink when idle
        .connect(&db_url)
        .await?;

    // Execute PRAGMA statements first (these cannot be run inside a transaction)
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;", // Balance between safety and performance
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY,
            name          TEXT    NOT NULL UNIQUE
        );",
        r"
        CREATE TABLE IF NOT EXISTS contests (
            id            INTEGER PRIMARY KEY,
            code          TEXT    NOT NULL UNIQUE,
            title         TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            start_time    TEXT,
            end_time      TEXT
        );",
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id               INTEGER PRIMARY KEY,
            contest_id       INTEGER NOT NULL,
            title            TEXT    NOT NULL,
            description      TEXT    NOT NULL DEFAULT '',
            sample_input     TEXT    NOT NULL DEFAULT '',
            sample_output    TEXT    NOT NULL DEFAULT '',
            time_limit_secs  INTEGER,
            memory_limit_mb  INTEGER,
            FOREIGN KEY (contest_id) REFERENCES contests (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS test_cases (
            id               INTEGER PRIMARY KEY,
            problem_id       INTEGER NOT NULL,
            position         INTEGER NOT NULL,
            input            TEXT    NOT NULL,
            expected_output  TEXT    NOT NULL,
            FOREIGN KEY (problem_id) REFERENCES problems (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id            TEXT    PRIMARY KEY,
            user_id       INTEGER NOT NULL,
            contest_id    INTEGER NOT NULL,
            problem_id    INTEGER NOT NULL,
            language      TEXT    NOT NULL,
            source_code   TEXT    NOT NULL,
            status        TEXT    NOT NULL,
            verdict       TEXT,
            error_detail  TEXT,
            time_ms       INTEGER,
            memory_kb     INTEGER,
            degraded      INTEGER NOT NULL DEFAULT 0,
            created_time  TEXT    NOT NULL,
            updated_time  TEXT    NOT NULL,
            FOREIGN KEY (user_id)    REFERENCES users (id),
            FOREIGN KEY (contest_id) REFERENCES contests (id),
            FOREIGN KEY (problem_id) REFERENCES problems (id)
        );",
        "INSERT OR IGNORE INTO users (id, name) VALUES (0, 'root');",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Seeds the demo contest with its three problems when the database is
/// empty, so a fresh install is immediately judgeable.
pub async fn seed_demo_data(pool: &SqlitePool) -> sqlx::Result<()> {
    let contests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contests")
        .fetch_one(pool)
        .await?;
    if contests > 0 {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let contest_id = sqlx::query(
        "INSERT INTO contests (code, title, description, start_time, end_time) VALUES (?, ?, ?, ?, ?)",
    )
    .bind("CONTEST001")
    .bind("Gavel Demo Contest")
    .bind("Solve these problems to test your setup.")
    .bind(create_timestamp())
    .bind(create_timestamp())
    .execute(tx.as_mut())
    .await?
    .last_insert_rowid();

    struct SeedProblem<'a> {
        title: &'a str,
        description: &'a str,
        sample: (&'a str, &'a str),
        time_limit_secs: i64,
        cases: &'a [(&'a str, &'a str)],
    }

    let problems = [
        SeedProblem {
            title: "Sum of Two Numbers",
            description: "Read two integers separated by a space and print their sum.",
            sample: ("5 3", "8"),
            time_limit_secs: 2,
            cases: &[("5 3", "8"), ("10 20", "30"), ("-5 5", "0"), ("0 0", "0")],
        },
        SeedProblem {
            title: "Factorial",
            description: "Read a single integer n (0 <= n <= 10) and print n!.",
            sample: ("5", "120"),
            time_limit_secs: 3,
            cases: &[("5", "120"), ("3", "6"), ("0", "1"), ("1", "1")],
        },
        SeedProblem {
            title: "Fibonacci Sequence",
            description: "Read a single integer n (1 <= n <= 20) and print the nth Fibonacci number.",
            sample: ("7", "13"),
            time_limit_secs: 2,
            cases: &[("7", "13"), ("1", "1"), ("2", "1"), ("10", "55")],
        },
    ];

    for problem in &problems {
        let problem_id = sqlx::query(
            r"
            INSERT INTO problems
                (contest_id, title, description, sample_input, sample_output, time_limit_secs, memory_limit_mb)
            VALUES (?, ?, ?, ?, ?, ?, 128)
            ",
        )
        .bind(contest_id)
        .bind(problem.title)
        .bind(problem.description)
        .bind(problem.sample.0)
        .bind(problem.sample.1)
        .bind(problem.time_limit_secs)
        .execute(tx.as_mut())
        .await?
        .last_insert_rowid();

        for (position, (input, expected)) in problem.cases.iter().enumerate() {
            sqlx::query(
                "INSERT INTO test_cases (problem_id, position, input, expected_output) VALUES (?, ?, ?, ?)",
            )
            .bind(problem_id)
            .bind(position as i64)
            .bind(input)
            .bind(expected)
            .execute(tx.as_mut())
            .await?;
        }
    }

    tx.commit().await?;
    log::info!("Seeded demo contest with {} problems", problems.len());
    Ok(())
}

pub async fn get_or_create_user(name: &str, pool: Arc<SqlitePool>) -> sqlx::Result<i64> {
    let existing = sqlx::query("SELECT id FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool.as_ref())
        .await?;

    if let Some(row) = existing {
        return row.try_get("id");
    }

    let id = sqlx::query("INSERT INTO users (name) VALUES (?)")
        .bind(name)
        .execute(pool.as_ref())
        .await?
        .last_insert_rowid();

    log::info!("Created user '{name}' with id {id}");
    Ok(id)
}

/// Returns `(contest_id, title)` when the problem exists.
pub async fn find_problem(id: i64, pool: Arc<SqlitePool>) -> sqlx::Result<Option<(i64, String)>> {
    let row = sqlx::query("SELECT contest_id, title FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await?;

    row.map(|r| Ok((r.try_get("contest_id")?, r.try_get("title")?)))
        .transpose()
}

/// Fetches a problem with its test cases eagerly loaded, in definition order.
pub async fn fetch_problem_with_cases(id: i64, pool: Arc<SqlitePool>) -> sqlx::Result<Problem> {
    let row = sqlx::query(
        "SELECT id, contest_id, title, time_limit_secs, memory_limit_mb FROM problems WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    let cases = sqlx::query_as::<_, TestCase>(
        "SELECT input, expected_output FROM test_cases WHERE problem_id = ? ORDER BY position",
    )
    .bind(id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(Problem {
        id: row.try_get("id")?,
        contest_id: row.try_get("contest_id")?,
        title: row.try_get("title")?,
        time_limit_secs: row.try_get("time_limit_secs")?,
        memory_limit_mb: row.try_get("memory_limit_mb")?,
        cases,
    })
}

pub async fn create_submission(
    submission: &Submission,
    pool: Arc<SqlitePool>,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO submissions
            (id, user_id, contest_id, problem_id, language, source_code, status, created_time, updated_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&submission.id)
    .bind(submission.user_id)
    .bind(submission.contest_id)
    .bind(submission.problem_id)
    .bind(&submission.language)
    .bind(&submission.source_code)
    .bind(submission.status.as_str())
    .bind(&submission.created_time)
    .bind(&submission.created_time)
    .execute(pool.as_ref())
    .await?;

    Ok(())
}

/// Rolls back an intake that could not be dispatched (queue saturated).
pub async fn delete_submission(id: &str, pool: Arc<SqlitePool>) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM submissions WHERE id = ?")
        .bind(id)
        .execute(pool.as_ref())
        .await?;
    Ok(())
}

#[derive(FromRow)]
struct SubmissionRow {
    id: String,
    user_id: i64,
    contest_id: i64,
    problem_id: i64,
    language: String,
    source_code: String,
    status: String,
    verdict: Option<String>,
    error_detail: Option<String>,
    time_ms: Option<i64>,
    memory_kb: Option<i64>,
    degraded: bool,
    created_time: String,
}

impl SubmissionRow {
    fn into_submission(self) -> sqlx::Result<Submission> {
        let status = Status::parse(&self.status)
            .ok_or_else(|| sqlx::Error::Decode(format!("bad status '{}'", self.status).into()))?;
        let verdict = self
            .verdict
            .as_deref()
            .map(|v| {
                Verdict::parse(v)
                    .ok_or_else(|| sqlx::Error::Decode(format!("bad verdict '{v}'").into()))
            })
            .transpose()?;

        Ok(Submission {
            id: self.id,
            user_id: self.user_id,
            contest_id: self.contest_id,
            problem_id: self.problem_id,
            language: self.language,
            source_code: self.source_code,
            status,
            verdict,
            error_detail: self.error_detail,
            time_ms: self.time_ms,
            memory_kb: self.memory_kb,
            degraded: self.degraded,
            created_time: self.created_time,
        })
    }
}

pub async fn fetch_submission(id: &str, pool: Arc<SqlitePool>) -> sqlx::Result<Submission> {
    let row = sqlx::query_as::<_, SubmissionRow>(
        r"
        SELECT id, user_id, contest_id, problem_id, language, source_code,
               status, verdict, error_detail, time_ms, memory_kb, degraded, created_time
        FROM submissions
        WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_one(pool.as_ref())
    .await?;

    row.into_submission()
}

/// Persists the `pending -> running` transition. This happens before any
/// execution work so a crash mid-judgment is observable as stuck running.
pub async fn mark_running(id: &str, pool: Arc<SqlitePool>) -> sqlx::Result<()> {
    let now = create_timestamp();
    let updated = sqlx::query(
        "UPDATE submissions SET status = 'running', updated_time = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(&now)
    .bind(id)
    .execute(pool.as_ref())
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Writes the terminal state in one transaction-free update, so readers only
/// ever observe a fully-formed snapshot. This is the last action of a
/// judging task.
pub async fn save_terminal(
    id: &str,
    verdict: Verdict,
    error_detail: Option<&str>,
    time_ms: i64,
    degraded: bool,
    pool: Arc<SqlitePool>,
) -> sqlx::Result<()> {
    let now = create_timestamp();
    sqlx::query(
        r"
        UPDATE submissions
        SET status = 'completed', verdict = ?, error_detail = ?, time_ms = ?, degraded = ?, updated_time = ?
        WHERE id = ?
        ",
    )
    .bind(verdict.as_str())
    .bind(error_detail)
    .bind(time_ms)
    .bind(degraded)
    .bind(&now)
    .bind(id)
    .execute(pool.as_ref())
    .await?;

    Ok(())
}

/// Read-side snapshot for the API, joined with the owning user and problem.
pub async fn fetch_snapshot(
    id: &str,
    pool: Arc<SqlitePool>,
) -> sqlx::Result<Option<SubmissionSnapshot>> {
    let row = sqlx::query(
        r"
        SELECT s.id, s.status, s.verdict, s.error_detail, s.time_ms, s.memory_kb,
               s.degraded, s.created_time, u.name AS user_name, p.title AS problem_title
        FROM submissions s
        JOIN users u ON u.id = s.user_id
        JOIN problems p ON p.id = s.problem_id
        WHERE s.id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status_text: String = row.try_get("status")?;
    let status = Status::parse(&status_text)
        .ok_or_else(|| sqlx::Error::Decode(format!("bad status '{status_text}'").into()))?;
    let verdict = row
        .try_get::<Option<String>, _>("verdict")?
        .as_deref()
        .map(|v| {
            Verdict::parse(v)
                .ok_or_else(|| sqlx::Error::Decode(format!("bad verdict '{v}'").into()))
        })
        .transpose()?;

    Ok(Some(SubmissionSnapshot {
        submission_id: row.try_get("id")?,
        status,
        verdict,
        error_detail: row.try_get("error_detail")?,
        execution_time_ms: row.try_get("time_ms")?,
        memory_used_kb: row.try_get("memory_kb")?,
        degraded: row.try_get("degraded")?,
        submitted_at: row.try_get("created_time")?,
        user_name: row.try_get("user_name")?,
        problem_title: row.try_get("problem_title")?,
    }))
}
