use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use gavel::config::{JudgeConfig, LanguageConfig};
use gavel::create_timestamp;
use gavel::database as db;
use gavel::routes::{Status, Submission, Verdict};
use gavel::sandbox::{CaseRunner, FallbackRunner};
use gavel::worker::run_judging_task;

async fn setup_db() -> (Arc<SqlitePool>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("gavel-test.sqlite3");

    let pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize test database");
    db::seed_demo_data(&pool)
        .await
        .expect("Failed to seed demo data");

    (Arc::new(pool), dir)
}

fn languages() -> Vec<LanguageConfig> {
    vec![LanguageConfig {
        name: "java".to_string(),
        file_name: "Main.java".to_string(),
        image: "eclipse-temurin:17".to_string(),
        compile: Some("javac Main.java".to_string()),
        run: "java Main".to_string(),
    }]
}

fn fallback_factory(_: &LanguageConfig) -> Box<dyn CaseRunner> {
    Box::new(FallbackRunner)
}

/// `block_on` panics on an executor thread, so this factory only completes
/// when backend selection happens on the blocking pool.
fn blocking_context_factory(_: &LanguageConfig) -> Box<dyn CaseRunner> {
    tokio::runtime::Handle::current().block_on(async {});
    Box::new(FallbackRunner)
}

async fn problem_id_by_title(title: &str, pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT id FROM problems WHERE title = ?")
        .bind(title)
        .fetch_one(pool)
        .await
        .expect("Problem not seeded")
}

async fn insert_pending_submission(
    problem_id: i64,
    source_code: &str,
    pool: Arc<SqlitePool>,
) -> String {
    let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: 0,
        contest_id: 1,
        problem_id,
        language: "java".to_string(),
        source_code: source_code.to_string(),
        status: Status::Pending,
        verdict: None,
        error_detail: None,
        time_ms: None,
        memory_kb: None,
        degraded: false,
        created_time: create_timestamp(),
    };
    db::create_submission(&submission, pool)
        .await
        .expect("Failed to insert submission");
    submission.id
}

/// Inserts a problem with the given cases, returning its id.
async fn insert_problem(cases: &[(&str, &str)], pool: &SqlitePool) -> i64 {
    let problem_id = sqlx::query(
        "INSERT INTO problems (contest_id, title, time_limit_secs, memory_limit_mb) VALUES (1, 'ad-hoc', 2, 128)",
    )
    .execute(pool)
    .await
    .expect("Failed to insert problem")
    .last_insert_rowid();

    for (position, (input, expected)) in cases.iter().enumerate() {
        sqlx::query(
            "INSERT INTO test_cases (problem_id, position, input, expected_output) VALUES (?, ?, ?, ?)",
        )
        .bind(problem_id)
        .bind(position as i64)
        .bind(input)
        .bind(expected)
        .execute(pool)
        .await
        .expect("Failed to insert test case");
    }

    problem_id
}

#[tokio::test]
async fn sum_problem_is_accepted_under_fallback_judging() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Sum of Two Numbers", &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;

    let snapshot = db::fetch_snapshot(&id, pool)
        .await
        .expect("Failed to fetch snapshot")
        .expect("Submission vanished");

    assert_eq!(snapshot.status, Status::Completed);
    assert_eq!(snapshot.verdict, Some(Verdict::Accepted));
    assert_eq!(snapshot.error_detail, None);
    // The submission was judged without isolation and must say so
    assert!(snapshot.degraded);
    assert!(snapshot.execution_time_ms.is_some());
}

#[tokio::test]
async fn inconsistent_expected_output_fails_citing_the_sum() {
    let (pool, _dir) = setup_db().await;
    let problem_id = insert_problem(&[("5 3", "8"), ("5 3", "9")], &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;

    let snapshot = db::fetch_snapshot(&id, pool).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Completed);
    assert_eq!(snapshot.verdict, Some(Verdict::WrongAnswer));
    let detail = snapshot.error_detail.expect("detail must be recorded");
    // The failing case is the second one; the detail cites the correct sum
    assert!(detail.contains("test case 2"), "unexpected detail: {detail}");
    assert!(detail.contains('8'), "unexpected detail: {detail}");
}

#[tokio::test]
async fn missing_problem_still_reaches_a_terminal_state() {
    let (pool, _dir) = setup_db().await;

    // Point the submission at a problem that does not exist. Referential
    // integrity would normally forbid this, which is exactly the kind of
    // unanticipated breakage the task must survive.
    sqlx::query("PRAGMA foreign_keys = OFF;")
        .execute(pool.as_ref())
        .await
        .unwrap();
    let id = insert_pending_submission(424242, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;

    // The API snapshot joins against problems, so read the raw record
    let record = db::fetch_submission(&id, pool).await.unwrap();
    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.verdict, Some(Verdict::RuntimeError));
    assert!(
        record
            .error_detail
            .as_deref()
            .unwrap()
            .contains("Internal error during judgment")
    );
}

#[tokio::test]
async fn unconfigured_language_still_reaches_a_terminal_state() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Factorial", &pool).await;
    let id = insert_pending_submission(problem_id, "print()", pool.clone()).await;

    // The submission claims java but the config only knows python
    let python_only = vec![LanguageConfig {
        name: "python".to_string(),
        file_name: "main.py".to_string(),
        image: "python:3.12-alpine".to_string(),
        compile: None,
        run: "python3 main.py".to_string(),
    }];

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &python_only,
        &fallback_factory,
        pool.clone(),
    )
    .await;

    let snapshot = db::fetch_snapshot(&id, pool).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Completed);
    assert_eq!(snapshot.verdict, Some(Verdict::RuntimeError));
}

#[tokio::test]
async fn unreadable_record_is_still_forced_terminal() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Sum of Two Numbers", &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    // Corrupt the lifecycle text so the record cannot even be loaded
    sqlx::query("UPDATE submissions SET status = 'judging' WHERE id = ?")
        .bind(&id)
        .execute(pool.as_ref())
        .await
        .unwrap();

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;

    let record = db::fetch_submission(&id, pool).await.unwrap();
    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.verdict, Some(Verdict::RuntimeError));
    assert!(
        record
            .error_detail
            .as_deref()
            .unwrap()
            .contains("Internal error during judgment")
    );
}

#[tokio::test]
async fn runner_selection_happens_on_the_blocking_pool() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Sum of Two Numbers", &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &blocking_context_factory,
        pool.clone(),
    )
    .await;

    // A factory panic would surface as a runtime-error verdict instead
    let snapshot = db::fetch_snapshot(&id, pool).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Completed);
    assert_eq!(snapshot.verdict, Some(Verdict::Accepted));
}

#[tokio::test]
async fn completed_submissions_are_not_judged_twice() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Sum of Two Numbers", &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;
    let first = db::fetch_snapshot(&id, pool.clone()).await.unwrap().unwrap();

    // A second dispatch of the same id must leave the terminal record alone
    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;
    let second = db::fetch_snapshot(&id, pool).await.unwrap().unwrap();

    assert_eq!(first.status, Status::Completed);
    assert_eq!(second.verdict, first.verdict);
    assert_eq!(second.submitted_at, first.submitted_at);
}

#[tokio::test]
async fn workspaces_are_cleaned_up_after_judging() {
    let (pool, _dir) = setup_db().await;
    let problem_id = problem_id_by_title("Sum of Two Numbers", &pool).await;
    let id = insert_pending_submission(problem_id, "class Main {}", pool.clone()).await;

    run_judging_task(
        &id,
        &JudgeConfig::default(),
        &languages(),
        &fallback_factory,
        pool.clone(),
    )
    .await;

    let workspace_dir = std::env::temp_dir()
        .join("gavel")
        .join(format!("submission-{id}"));
    assert!(!workspace_dir.exists());
}
