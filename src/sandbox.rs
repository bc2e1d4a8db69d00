mod docker;
mod fallback;

pub use docker::DockerRunner;
pub use fallback::FallbackRunner;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::config::LanguageConfig;
use crate::database::TestCase;

// Ceiling on the availability probe so a wedged container daemon degrades
// the task instead of hanging it.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resource ceiling applied to one compile+run cycle.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub time_limit: Duration,
    pub memory_limit_mb: u32,
    pub cpus: u32,
}

/// Classification of a single test case execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseVerdict {
    Passed,
    WrongAnswer { expected: String, actual: String },
    TimeLimitExceeded,
    RuntimeError { diagnostic: String },
}

/// Result of running one test case, returned on every path including
/// launch failures. Failures travel by value, never as errors.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub verdict: CaseVerdict,
    pub time_ms: u64,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == CaseVerdict::Passed
    }
}

/// Trait for the two execution backends: the isolated docker runner and the
/// degraded fallback used when no container runtime is present.
///
/// Implementations are synchronous and run on the blocking pool; the docker
/// runner re-enters the tokio runtime internally for subprocess I/O.
pub trait CaseRunner: Send + Sync {
    /// Runs one test case against the submitted source and classifies the
    /// result. Must not panic and must not return early without an outcome.
    fn run_case(&self, source: &Path, case: &TestCase, limits: &ResourceLimits) -> CaseOutcome;

    /// Whether verdicts from this runner are an approximation rather than a
    /// real sandboxed judgment.
    fn degraded(&self) -> bool {
        false
    }
}

/// Probes for a container-capable execution backend on the host.
///
/// Any failure (binary missing, permission denied, probe timeout) resolves
/// to `false`. Callers invoke this once per judging task so availability can
/// recover or degrade between submissions. Runs on the blocking pool and
/// re-enters the runtime for the bounded subprocess wait, like the docker
/// backend itself.
pub fn isolation_available() -> bool {
    tokio::runtime::Handle::current().block_on(async {
        let child = tokio::process::Command::new("docker")
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let Ok(mut child) = child else {
            return false;
        };
        match tokio::time::timeout(PROBE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    })
}

/// How the judging task obtains its execution backend. The worker passes
/// [`probe_and_select`]; tests substitute a fixed runner.
pub type RunnerFactory = dyn Fn(&LanguageConfig) -> Box<dyn CaseRunner> + Send + Sync;

/// Probes the host and selects the backend for one judging task. Must be
/// called from the blocking pool, never from an executor thread.
pub fn probe_and_select(language: &LanguageConfig) -> Box<dyn CaseRunner> {
    select_runner(isolation_available(), language)
}

/// Selects the execution backend for one judging task based on the probe
/// result. The fallback cannot run untrusted code safely, so it never
/// executes anything.
pub fn select_runner(isolation: bool, language: &LanguageConfig) -> Box<dyn CaseRunner> {
    if isolation {
        Box::new(DockerRunner::new(language.clone()))
    } else {
        log::warn!(
            "No isolation runtime available, judging with the degraded fallback evaluator"
        );
        Box::new(FallbackRunner)
    }
}

/// Compares program output against the expected output.
///
/// Leading and trailing whitespace of the whole stream is trimmed; no
/// internal normalization is applied. This is a deliberate policy choice.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}
