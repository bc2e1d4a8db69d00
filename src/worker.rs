use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{JudgeConfig, LanguageConfig};
use crate::database as db;
use crate::evaluator;
use crate::queue::JobQueue;
use crate::routes::{Status, Submission, Verdict};
use crate::sandbox::{ResourceLimits, RunnerFactory};
use crate::workspace::Workspace;

/// Terminal result of one judging task, ready to be written back onto the
/// submission record.
#[derive(Debug)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    pub error_detail: Option<String>,
    pub time_ms: i64,
    pub degraded: bool,
}

/// Judging worker loop. Pops submission ids from the bounded queue, drives
/// each through its state machine, and releases the in-flight slot when the
/// terminal write is done.
pub async fn worker(
    id: u8,
    judge: Arc<JudgeConfig>,
    languages: Arc<Vec<LanguageConfig>>,
    db_pool: Arc<SqlitePool>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            submission_id = queue.pop() => {
                log::info!("Worker {id} got submission {submission_id} from queue");
                run_judging_task(
                    &submission_id,
                    &judge,
                    &languages,
                    &crate::sandbox::probe_and_select,
                    db_pool.clone(),
                )
                .await;
                queue.finish(&submission_id);
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

/// Drives one submission through `pending -> running -> completed`.
///
/// The running transition is persisted before any execution work. Whatever
/// happens afterwards, a terminal state is written: evaluation failures
/// surface as classified verdicts and internal errors degrade to a
/// runtime-error verdict rather than leaving the submission running.
pub async fn run_judging_task(
    submission_id: &str,
    judge: &JudgeConfig,
    languages: &[LanguageConfig],
    runner_factory: &'static RunnerFactory,
    db_pool: Arc<SqlitePool>,
) {
    let submission = match db::fetch_submission(submission_id, db_pool.clone()).await {
        Ok(submission) => submission,
        Err(sqlx::Error::RowNotFound) => {
            log::error!("Submission {submission_id} does not exist, discarded");
            return;
        }
        Err(e) => {
            log::error!("Failed to fetch submission {submission_id}: {e}");
            force_terminal(submission_id, &e.to_string(), db_pool).await;
            return;
        }
    };

    if submission.status != Status::Pending {
        log::warn!(
            "Submission {submission_id} is already {}, not judging again",
            submission.status.as_str()
        );
        return;
    }

    match db::mark_running(submission_id, db_pool.clone()).await {
        Ok(()) => {}
        // Zero rows updated means another task already claimed the record
        Err(sqlx::Error::RowNotFound) => {
            log::warn!("Submission {submission_id} was claimed elsewhere, not judging again");
            return;
        }
        Err(e) => {
            log::error!("Failed to mark submission {submission_id} running: {e}");
            force_terminal(submission_id, &e.to_string(), db_pool).await;
            return;
        }
    }

    let outcome = judge_submission(&submission, judge, languages, runner_factory, db_pool.clone()).await;

    // Final state write is the last action of the task
    match db::save_terminal(
        submission_id,
        outcome.verdict,
        outcome.error_detail.as_deref(),
        outcome.time_ms,
        outcome.degraded,
        db_pool,
    )
    .await
    {
        Ok(()) => log::info!(
            "Submission {submission_id} completed with verdict {}",
            outcome.verdict.as_str()
        ),
        Err(e) => log::error!("Failed to save terminal state for submission {submission_id}: {e}"),
    }
}

/// Best-effort terminal write for failures before evaluation starts. A
/// submission left pending forever is worse than a runtime-error verdict.
async fn force_terminal(submission_id: &str, cause: &str, db_pool: Arc<SqlitePool>) {
    let detail = format!("Internal error during judgment: {cause}");
    if let Err(e) = db::save_terminal(
        submission_id,
        Verdict::RuntimeError,
        Some(detail.as_str()),
        0,
        false,
        db_pool,
    )
    .await
    {
        log::error!("Failed to force terminal state for submission {submission_id}: {e}");
    }
}

/// Evaluates one submission and maps the result to a terminal outcome.
/// Never fails: internal errors become a runtime-error verdict carrying the
/// underlying cause.
pub async fn judge_submission(
    submission: &Submission,
    judge: &JudgeConfig,
    languages: &[LanguageConfig],
    runner_factory: &'static RunnerFactory,
    db_pool: Arc<SqlitePool>,
) -> JudgeOutcome {
    match try_judge(submission, judge, languages, runner_factory, db_pool).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Internal error judging submission {}: {e:#}", submission.id);
            JudgeOutcome {
                verdict: Verdict::RuntimeError,
                error_detail: Some(format!("Internal error during judgment: {e:#}")),
                time_ms: 0,
                degraded: false,
            }
        }
    }
}

async fn try_judge(
    submission: &Submission,
    judge: &JudgeConfig,
    languages: &[LanguageConfig],
    runner_factory: &'static RunnerFactory,
    db_pool: Arc<SqlitePool>,
) -> Result<JudgeOutcome> {
    let problem = db::fetch_problem_with_cases(submission.problem_id, db_pool)
        .await
        .context("Failed to load problem")?;
    let language = languages
        .iter()
        .find(|l| l.name == submission.language)
        .cloned()
        .with_context(|| format!("No configuration for language '{}'", submission.language))?;

    let limits = ResourceLimits {
        time_limit: Duration::from_secs(
            problem
                .time_limit_secs
                .map(|s| s as u64)
                .unwrap_or_else(|| judge.default_time_limit_secs()),
        ),
        memory_limit_mb: problem
            .memory_limit_mb
            .map(|m| m as u32)
            .unwrap_or_else(|| judge.memory_limit_mb()),
        cpus: judge.cpus(),
    };

    let submission_id = submission.id.clone();
    let source_code = submission.source_code.clone();
    let cases = problem.cases;

    let (aggregate, degraded) =
        tokio::task::spawn_blocking(move || -> Result<(evaluator::Aggregate, bool)> {
            // The backend is chosen per task so runtime availability can
            // recover or degrade between submissions; the probe may block,
            // so selection happens on the blocking pool.
            let runner = runner_factory(&language);
            let degraded = runner.degraded();

            let workspace =
                Workspace::acquire(&submission_id).context("Failed to create workspace")?;
            let source = workspace
                .write_source(&language.file_name, &source_code)
                .context("Failed to write source file")?;

            let aggregate = evaluator::evaluate(runner.as_ref(), &source, &cases, &limits);
            Ok((aggregate, degraded))
            // workspace is released here, on success and on unwinding alike
        })
        .await
        .context("Judging task aborted")??;

    let time_ms = aggregate.total_time_ms as i64;
    Ok(match aggregate.first_failure {
        None => JudgeOutcome {
            verdict: Verdict::Accepted,
            error_detail: None,
            time_ms,
            degraded,
        },
        Some(failure) => JudgeOutcome {
            verdict: failure.verdict,
            error_detail: Some(failure.detail),
            time_ms,
            degraded,
        },
    })
}
