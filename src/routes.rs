mod submissions;

pub use submissions::{get_submission_handler, post_submission_handler};

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

/// Lifecycle of a submission. Transitions are one-directional:
/// `Pending -> Running -> Completed`, and `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Final classification of a submission. Set exactly when the status is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::RuntimeError => "runtime_error",
            Self::CompilationError => "compilation_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "wrong_answer" => Some(Self::WrongAnswer),
            "time_limit_exceeded" => Some(Self::TimeLimitExceeded),
            "memory_limit_exceeded" => Some(Self::MemoryLimitExceeded),
            "runtime_error" => Some(Self::RuntimeError),
            "compilation_error" => Some(Self::CompilationError),
            _ => None,
        }
    }
}

/// Full submission record as the judging task sees it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub user_id: i64,
    pub contest_id: i64,
    pub problem_id: i64,
    pub language: String,
    pub source_code: String,
    pub status: Status,
    pub verdict: Option<Verdict>,
    pub error_detail: Option<String>,
    pub time_ms: Option<i64>,
    pub memory_kb: Option<i64>,
    pub degraded: bool,
    pub created_time: String,
}

#[derive(Deserialize, Debug)]
pub struct SubmitRequest {
    pub user_name: String,
    pub problem_id: i64,
    pub language: Option<String>,
    pub source_code: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub submission_id: String,
    pub status: Status,
}

/// Read-side snapshot of a submission, observable at any lifecycle point.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmissionSnapshot {
    pub submission_id: String,
    pub status: Status,
    pub verdict: Option<Verdict>,
    pub error_detail: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub memory_used_kb: Option<i64>,
    pub degraded: bool,
    pub submitted_at: String,
    pub user_name: String,
    pub problem_title: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub reason: &'static str,
    pub code: u32,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}
