use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::config::LanguageConfig;
use crate::database::TestCase;

use super::{CaseOutcome, CaseRunner, CaseVerdict, ResourceLimits, outputs_match};

// Exit code produced by coreutils `timeout` when the run step is killed.
const TIMEOUT_EXIT_CODE: i32 = 124;

// Wall-clock headroom on top of the per-case limit for container startup and
// compilation, which happen before the timed run step.
const STARTUP_GRACE: Duration = Duration::from_secs(10);

enum ContainerResult {
    Finished(std::process::Output),
    WallClockExceeded,
}

/// Executes one compile+run cycle per test case inside a docker container
/// with no network, a memory ceiling and a CPU allotment. The source file is
/// bind-mounted read-only; the run step is wrapped by `timeout` inside the
/// container so a time limit surfaces as exit code 124.
pub struct DockerRunner {
    language: LanguageConfig,
}

impl DockerRunner {
    pub fn new(language: LanguageConfig) -> Self {
        Self { language }
    }

    /// Shell script executed inside the container. Compilation runs outside
    /// the per-case time limit; only the run step is wrapped.
    fn container_script(&self, time_limit: Duration) -> String {
        let run = format!("timeout {} {}", time_limit.as_secs().max(1), self.language.run);
        match &self.language.compile {
            Some(compile) => format!("{compile} && {run}"),
            None => run,
        }
    }

    async fn run_in_container(
        &self,
        source: &Path,
        input: &str,
        limits: &ResourceLimits,
    ) -> Result<ContainerResult> {
        let mount = format!("{}:/box/{}:ro", source.display(), self.language.file_name);
        let script = self.container_script(limits.time_limit);

        let mut cmd = tokio::process::Command::new("docker");
        cmd.arg("run")
            .arg("--rm")
            .arg("-i")
            .arg("-v")
            .arg(&mount)
            .arg(format!("--memory={}m", limits.memory_limit_mb))
            .arg(format!("--cpus={}", limits.cpus))
            .arg("--network=none")
            .arg("-w")
            .arg("/box")
            .arg(&self.language.image)
            .args(["sh", "-c", &script])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().context("Failed to spawn docker")?;

        let hard_cap = limits.time_limit + STARTUP_GRACE;
        match timeout(hard_cap, feed_and_wait(child, input)).await {
            Ok(output) => Ok(ContainerResult::Finished(
                output.context("Failed to collect container output")?,
            )),
            // kill_on_drop reaps the wedged container
            Err(_) => Ok(ContainerResult::WallClockExceeded),
        }
    }

    fn classify(&self, output: std::process::Output, case: &TestCase) -> CaseVerdict {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        match output.status.code() {
            Some(0) => {
                if outputs_match(&stdout, &case.expected_output) {
                    CaseVerdict::Passed
                } else {
                    CaseVerdict::WrongAnswer {
                        expected: case.expected_output.trim().to_string(),
                        actual: stdout.trim().to_string(),
                    }
                }
            }
            Some(TIMEOUT_EXIT_CODE) => CaseVerdict::TimeLimitExceeded,
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut diagnostic = stdout;
                if !stderr.trim().is_empty() {
                    if !diagnostic.is_empty() {
                        diagnostic.push('\n');
                    }
                    diagnostic.push_str(stderr.trim_end());
                }
                CaseVerdict::RuntimeError {
                    diagnostic: format!(
                        "Process exited with code {:?}: {}",
                        code,
                        diagnostic.trim()
                    ),
                }
            }
        }
    }
}

/// Feeds stdin and collects output concurrently. Writing the whole input
/// before draining stdout would deadlock against a program that floods its
/// output pipe before reading, so both sides make progress together. The
/// program may exit without consuming its input; a broken pipe is not an
/// error. Stdin is closed once written so programs reading until EOF
/// terminate.
async fn feed_and_wait(
    mut child: tokio::process::Child,
    input: &str,
) -> std::io::Result<std::process::Output> {
    let stdin = child.stdin.take();
    let feed = async {
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(input.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
        }
    };

    let (_, output) = tokio::join!(feed, child.wait_with_output());
    output
}

impl CaseRunner for DockerRunner {
    fn run_case(&self, source: &Path, case: &TestCase, limits: &ResourceLimits) -> CaseOutcome {
        let started = Instant::now();

        let result = tokio::runtime::Handle::current()
            .block_on(self.run_in_container(source, &case.input, limits));

        let time_ms = started.elapsed().as_millis() as u64;
        let verdict = match result {
            Ok(ContainerResult::Finished(output)) => self.classify(output, case),
            Ok(ContainerResult::WallClockExceeded) => CaseVerdict::TimeLimitExceeded,
            Err(e) => CaseVerdict::RuntimeError {
                diagnostic: format!("Failed to execute submission: {e:#}"),
            },
        };

        CaseOutcome { verdict, time_ms }
    }
}
