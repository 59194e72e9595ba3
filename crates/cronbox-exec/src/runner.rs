use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use crate::types::{RunOutcome, RunReport};

/// Spawns resolved task commands through the platform shell.
///
/// Stateless; callers share one instance freely.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Execute `command` and wait for it to exit.
    ///
    /// An empty (or whitespace-only) command is a no-op and reports
    /// [`RunOutcome::Skipped`]. Spawn failure and non-zero exit both come
    /// back as a failed [`RunReport`] with the error text captured; this
    /// method itself never errors. There is no deadline — the await lasts
    /// for the command's full runtime.
    pub async fn run(&self, command: &str) -> RunOutcome {
        if command.trim().is_empty() {
            debug!("empty resolved command; nothing to execute");
            return RunOutcome::Skipped;
        }

        debug!(command, "spawning command");
        let start = Instant::now();

        let spawned = shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "failed to spawn command");
                return RunOutcome::Completed(RunReport {
                    success: false,
                    output: String::new(),
                    error: Some(format!("spawn failed: {e}")),
                    duration_ms: elapsed_ms(start),
                });
            }
        };

        match child.wait_with_output().await {
            Ok(output) => {
                let combined = combine_output(&output.stdout, &output.stderr);
                let duration_ms = elapsed_ms(start);

                if output.status.success() {
                    RunOutcome::Completed(RunReport {
                        success: true,
                        output: combined,
                        error: None,
                        duration_ms,
                    })
                } else {
                    let error = match output.status.code() {
                        Some(code) => format!("exit status {code}"),
                        None => "terminated by signal".to_string(),
                    };
                    RunOutcome::Completed(RunReport {
                        success: false,
                        output: combined,
                        error: Some(error),
                        duration_ms,
                    })
                }
            }
            Err(e) => RunOutcome::Completed(RunReport {
                success: false,
                output: String::new(),
                error: Some(format!("wait failed: {e}")),
                duration_ms: elapsed_ms(start),
            }),
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> AsyncCommand {
    let mut cmd = AsyncCommand::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> AsyncCommand {
    let mut cmd = AsyncCommand::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut out = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&err);
    }
    out
}

fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_succeeds_with_captured_output() {
        let runner = CommandRunner::new();
        match runner.run("echo hi").await {
            RunOutcome::Completed(report) => {
                assert!(report.success);
                assert!(report.output.contains("hi"));
                assert!(report.error.is_none());
                assert!(report.duration_ms >= 0);
            }
            RunOutcome::Skipped => panic!("echo must not be skipped"),
        }
    }

    #[tokio::test]
    async fn stderr_is_part_of_combined_output() {
        let runner = CommandRunner::new();
        match runner.run("echo out; echo err 1>&2").await {
            RunOutcome::Completed(report) => {
                assert!(report.success);
                assert!(report.output.contains("out"));
                assert!(report.output.contains("err"));
            }
            RunOutcome::Skipped => panic!("unexpected skip"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_exit_status() {
        let runner = CommandRunner::new();
        match runner.run("exit 3").await {
            RunOutcome::Completed(report) => {
                assert!(!report.success);
                assert_eq!(report.error.as_deref(), Some("exit status 3"));
            }
            RunOutcome::Skipped => panic!("unexpected skip"),
        }
    }

    #[tokio::test]
    async fn shell_features_work_in_command_text() {
        // Redirection and pipes must behave as written — the command goes
        // through the shell, not a raw argv spawn.
        let runner = CommandRunner::new();
        match runner.run("printf 'a\\nb\\n' | wc -l").await {
            RunOutcome::Completed(report) => {
                assert!(report.success);
                assert!(report.output.trim().ends_with('2'));
            }
            RunOutcome::Skipped => panic!("unexpected skip"),
        }
    }

    #[tokio::test]
    async fn empty_command_is_skipped_not_failed() {
        let runner = CommandRunner::new();
        assert!(matches!(runner.run("").await, RunOutcome::Skipped));
        assert!(matches!(runner.run("   \t ").await, RunOutcome::Skipped));
    }
}
