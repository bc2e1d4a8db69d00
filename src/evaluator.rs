use std::path::Path;

use crate::database::TestCase;
use crate::routes::Verdict;
use crate::sandbox::{CaseRunner, CaseVerdict, ResourceLimits};

/// First non-passing test case of an evaluation.
#[derive(Debug, Clone)]
pub struct Failure {
    pub case_index: usize,
    pub verdict: Verdict,
    pub detail: String,
}

/// Aggregate of one evaluation pass over a problem's test cases.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub first_failure: Option<Failure>,
    pub total_time_ms: u64,
}

impl Aggregate {
    pub fn all_passed(&self) -> bool {
        self.first_failure.is_none()
    }
}

/// Evaluates test cases in their defined order against the active runner.
///
/// Stops at the first non-passing case; cases after it are never executed and
/// contribute no time to the aggregate. The failing case's own elapsed time
/// is included.
pub fn evaluate(
    runner: &dyn CaseRunner,
    source: &Path,
    cases: &[TestCase],
    limits: &ResourceLimits,
) -> Aggregate {
    let mut total_time_ms = 0;

    for (case_index, case) in cases.iter().enumerate() {
        let outcome = runner.run_case(source, case, limits);
        total_time_ms += outcome.time_ms;

        if let Some(failure) = classify_failure(case_index, outcome.verdict) {
            log::debug!(
                "Test case {} failed with {}",
                case_index + 1,
                failure.verdict.as_str()
            );
            return Aggregate {
                first_failure: Some(failure),
                total_time_ms,
            };
        }
    }

    Aggregate {
        first_failure: None,
        total_time_ms,
    }
}

fn classify_failure(case_index: usize, verdict: CaseVerdict) -> Option<Failure> {
    let case_number = case_index + 1;
    match verdict {
        CaseVerdict::Passed => None,
        CaseVerdict::WrongAnswer { expected, actual } => Some(Failure {
            case_index,
            verdict: Verdict::WrongAnswer,
            detail: format!(
                "Wrong answer on test case {case_number}: expected '{expected}', got '{actual}'"
            ),
        }),
        CaseVerdict::TimeLimitExceeded => Some(Failure {
            case_index,
            verdict: Verdict::TimeLimitExceeded,
            detail: format!("Time limit exceeded on test case {case_number}"),
        }),
        CaseVerdict::RuntimeError { diagnostic } => Some(Failure {
            case_index,
            verdict: Verdict::RuntimeError,
            detail: format!("Runtime error on test case {case_number}: {diagnostic}"),
        }),
    }
}
