use actix_web::{HttpResponse, Responder, web};
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponse, Status, Submission, SubmitRequest, SubmitResponse};
use crate::config::LanguageConfig;
use crate::create_timestamp;
use crate::database as db;
use crate::queue::{JobQueue, PushError};

/// Submission intake: creates the record in its initial state and hands the
/// id to the dispatch queue. Rejects with 503 when the queue is saturated.
pub async fn post_submission_handler(
    queue: web::Data<JobQueue>,
    pool: web::Data<SqlitePool>,
    languages: web::Data<Vec<LanguageConfig>>,
    body: web::Json<SubmitRequest>,
) -> impl Responder {
    let body = body.into_inner();

    let language = match body.language.as_deref() {
        Some(name) => languages.iter().find(|l| l.name == name),
        None => languages.first(),
    };
    let Some(language) = language else {
        return HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        });
    };

    let problem = match db::find_problem(body.problem_id, pool.clone().into_inner()).await {
        Ok(problem) => problem,
        Err(e) => {
            log::error!("Failed to look up problem {}: {e}", body.problem_id);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };
    let Some((contest_id, _)) = problem else {
        return HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        });
    };

    let user_id = match db::get_or_create_user(&body.user_name, pool.clone().into_inner()).await {
        Ok(id) => id,
        Err(e) => {
            log::error!("Failed to resolve user '{}': {e}", body.user_name);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };

    let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        user_id,
        contest_id,
        problem_id: body.problem_id,
        language: language.name.clone(),
        source_code: body.source_code,
        status: Status::Pending,
        verdict: None,
        error_detail: None,
        time_ms: None,
        memory_kb: None,
        degraded: false,
        created_time: create_timestamp(),
    };

    if let Err(e) = db::create_submission(&submission, pool.clone().into_inner()).await {
        log::error!("Failed to insert submission into database: {e}");
        return HttpResponse::InternalServerError().json(ErrorResponse {
            reason: "ERR_EXTERNAL",
            code: 5,
        });
    }

    match queue.try_push(submission.id.clone()) {
        Ok(()) => {
            log::info!("Submission {} queued for judging", submission.id);
            HttpResponse::Ok().json(SubmitResponse {
                submission_id: submission.id,
                status: Status::Pending,
            })
        }
        Err(push_error) => {
            // Roll the record back so no undispatchable pending submission remains
            if let Err(e) = db::delete_submission(&submission.id, pool.into_inner()).await {
                log::warn!(
                    "Failed to roll back rejected submission {}: {e}",
                    submission.id
                );
            }
            match push_error {
                PushError::Saturated => {
                    log::warn!("Dispatch queue saturated, rejecting submission");
                    HttpResponse::ServiceUnavailable().json(ErrorResponse {
                        reason: "ERR_BUSY",
                        code: 7,
                    })
                }
                // A fresh uuid can only collide if something is badly wrong
                PushError::Duplicate => HttpResponse::InternalServerError().json(ErrorResponse {
                    reason: "ERR_INTERNAL",
                    code: 6,
                }),
            }
        }
    }
}

/// Snapshot read, valid at any lifecycle point including while running.
pub async fn get_submission_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<String>,
) -> impl Responder {
    let submission_id = path.into_inner();

    match db::fetch_snapshot(&submission_id, pool.into_inner()).await {
        Ok(Some(snapshot)) => HttpResponse::Ok().json(snapshot),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        }),
        Err(e) => {
            log::error!("Failed to fetch submission {submission_id}: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            })
        }
    }
}
