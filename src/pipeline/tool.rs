//! External tool invocation: run the conversion script under a deadline.
//!
//! ## Why a trait?
//!
//! The conversion tool is an opaque executable; orchestration logic only
//! cares about "ran within the deadline, exited zero, here are its streams".
//! [`ToolRunner`] is that narrow seam — tests drop in a scripted fake and
//! the production [`ProcessToolRunner`] stays a thin `tokio::process`
//! wrapper.
//!
//! ## Deadline semantics
//!
//! Exceeding the wall-clock deadline kills the child and reports
//! [`ConvertError::ToolTimeout`] — a different class from a non-zero exit,
//! because the caller can act on it differently (the tool may be healthy
//! but the input pathological). The child is explicitly killed and reaped
//! on timeout; `kill_on_drop` covers the remaining case of the whole
//! request future being dropped mid-run.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::job::ConversionJob;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// A fully-specified child-process invocation.
///
/// Always an explicit argument vector — never an interpolated shell string —
/// so a hostile original filename cannot inject commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
}

impl ToolInvocation {
    /// Build the invocation for a staged job.
    ///
    /// Basic variant:    `<python> <animate_script> <input> <job_id> [<index>]`
    /// Skeleton variant: `<python> <skeleton_script> <input> <job_id> [<index>] <skeleton>`
    ///
    /// The variant is selected solely by the presence of a staged skeleton
    /// descriptor. The tool runs with `data_dir` as its working directory
    /// and must write its artifact to `<data_dir>/<job_id>/video.gif`
    /// before exiting zero.
    pub fn for_job(job: &ConversionJob, config: &ServiceConfig) -> Self {
        let script = if job.skeleton_path.is_some() {
            &config.skeleton_script
        } else {
            &config.animate_script
        };

        let mut args = vec![
            script.display().to_string(),
            job.input_path.display().to_string(),
            job.id.clone(),
        ];
        if let Some(index) = job.index {
            args.push(index.to_string());
        }
        if let Some(ref skeleton) = job.skeleton_path {
            args.push(skeleton.display().to_string());
        }

        Self {
            program: config.python_bin.clone(),
            args,
            current_dir: config.data_dir.clone(),
        }
    }
}

/// Captured output of a completed (zero-exit) tool run.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Capability to run the conversion tool to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` and wait for it, enforcing `deadline`.
    ///
    /// Returns [`ToolOutput`] only for a zero exit within the deadline.
    /// A non-zero exit is [`ConvertError::ToolFailure`] with both streams
    /// captured; running past the deadline is [`ConvertError::ToolTimeout`].
    async fn run(
        &self,
        invocation: &ToolInvocation,
        deadline: Duration,
    ) -> Result<ToolOutput, ConvertError>;
}

/// Production runner: spawns a real child process.
#[derive(Debug, Default)]
pub struct ProcessToolRunner;

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        deadline: Duration,
    ) -> Result<ToolOutput, ConvertError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConvertError::Internal(format!(
                    "failed to spawn '{}': {e}",
                    invocation.program
                ))
            })?;

        // Drain both pipes concurrently with the wait: a tool that fills a
        // pipe buffer would otherwise deadlock against us.
        let stdout_task = tokio::spawn(slurp(child.stdout.take()));
        let stderr_task = tokio::spawn(slurp(child.stderr.take()));

        let status = match timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ConvertError::Internal(format!(
                    "failed waiting on conversion tool: {e}"
                )));
            }
            Err(_elapsed) => {
                // Deadline exceeded: terminate and reap so no orphan
                // process survives the request.
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out conversion tool");
                }
                return Err(ConvertError::ToolTimeout {
                    secs: deadline.as_secs(),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let status = match status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            return Err(ConvertError::ToolFailure {
                status,
                stdout,
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Read a child pipe to the end, lossily decoding as UTF-8.
async fn slurp<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        warn!(error = %e, "failed reading conversion tool output");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStage;

    fn config() -> ServiceConfig {
        ServiceConfig::builder()
            .bucket("b")
            .data_dir("/srv/app")
            .build()
            .unwrap()
    }

    fn job(skeleton: bool) -> ConversionJob {
        ConversionJob {
            id: "abc".into(),
            input_path: "/srv/app/drawings/abc_cat.png".into(),
            output_dir: "/srv/app/abc".into(),
            index: Some(2),
            skeleton_path: skeleton.then(|| PathBuf::from("/srv/app/abc/skeleton.json")),
            stage: JobStage::Staged,
        }
    }

    #[test]
    fn basic_variant_argument_order() {
        let inv = ToolInvocation::for_job(&job(false), &config());
        assert_eq!(inv.program, "python");
        assert_eq!(
            inv.args,
            vec![
                "image_to_animation.py",
                "/srv/app/drawings/abc_cat.png",
                "abc",
                "2",
            ]
        );
        assert_eq!(inv.current_dir, PathBuf::from("/srv/app"));
    }

    #[test]
    fn skeleton_presence_selects_custom_variant() {
        let inv = ToolInvocation::for_job(&job(true), &config());
        assert_eq!(inv.args[0], "image_to_animation_custom.py");
        assert_eq!(
            inv.args.last().map(String::as_str),
            Some("/srv/app/abc/skeleton.json")
        );
    }

    #[test]
    fn index_omitted_when_absent() {
        let mut j = job(false);
        j.index = None;
        let inv = ToolInvocation::for_job(&j, &config());
        assert_eq!(
            inv.args,
            vec!["image_to_animation.py", "/srv/app/drawings/abc_cat.png", "abc"]
        );
    }

    fn sh(args: &[&str]) -> ToolInvocation {
        ToolInvocation {
            program: "sh".into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            current_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn zero_exit_captures_stdout() {
        let out = ProcessToolRunner
            .run(&sh(&["-c", "echo forward; echo back >&2"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "forward");
        assert_eq!(out.stderr.trim(), "back");
    }

    #[tokio::test]
    async fn nonzero_exit_is_tool_failure_with_streams() {
        let err = ProcessToolRunner
            .run(&sh(&["-c", "echo boom >&2; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ConvertError::ToolFailure { status, stderr, .. } => {
                assert_eq!(status, "exit code 3");
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("expected ToolFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_overrun_is_timeout_not_failure() {
        let start = std::time::Instant::now();
        let err = ProcessToolRunner
            .run(&sh(&["-c", "sleep 30"]), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ToolTimeout { .. }), "got {err:?}");
        // the child must have been killed, not waited out
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unknown_program_is_internal_error() {
        let inv = ToolInvocation {
            program: "definitely-not-a-real-binary-7f3a".into(),
            args: vec![],
            current_dir: std::env::temp_dir(),
        };
        let err = ProcessToolRunner.run(&inv, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ConvertError::Internal(_)), "got {err:?}");
    }
}
