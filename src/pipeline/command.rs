//! Running external tools and turning their exit status into a typed result.
//!
//! Every adapter (rasterizer, OCR engine, merger, text extractor) goes through
//! [`run_tool`], so each invocation yields exactly one `Result<Output,
//! ToolError>` that the calling stage maps into its own error type.
//!
//! Child processes are spawned with `kill_on_drop(true)`: when a run is
//! cancelled the in-flight futures are dropped and their processes go with
//! them, instead of outliving the working directory they write into.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Longest stderr excerpt kept in an error message.
const STDERR_EXCERPT: usize = 400;

/// Failure of one external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (not installed, not executable).
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and reported failure.
    #[error("{program} failed{}{}", exit_suffix(.code), stderr_suffix(.stderr))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" with exit code {c}"),
        None => " (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Build a command with the defaults every tool invocation shares.
pub fn tool_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run `cmd` to completion.
///
/// Deadlines are the caller's business: wrap the returned future in
/// `tokio::time::timeout` and the child is killed when it is dropped.
///
/// Standard output and standard error are logged at debug level; a
/// non-success exit status becomes [`ToolError::Failed`] carrying a stderr
/// excerpt.
pub async fn run_tool(mut cmd: Command) -> Result<Output, ToolError> {
    let program = program_name(&cmd);
    trace!(program = %program, args = ?cmd.as_std().get_args().collect::<Vec<_>>(), "spawning");

    let output = cmd.output().await.map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    check_for_command_failure(&program, output)
}

/// Log a finished command's output and map its exit status.
pub fn check_for_command_failure(program: &str, output: Output) -> Result<Output, ToolError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!(program, output = %stdout.trim_end(), "standard output from command");
    }
    if !stderr.trim().is_empty() {
        debug!(program, output = %stderr.trim_end(), "standard error from command");
    }

    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: excerpt(&stderr),
        })
    }
}

fn program_name(cmd: &Command) -> String {
    let program = std::path::Path::new(cmd.as_std().get_program());
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .into_owned()
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.chars().count() <= STDERR_EXCERPT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(STDERR_EXCERPT).collect();
        format!("{cut}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_display_includes_code_and_stderr() {
        let e = ToolError::Failed {
            program: "qpdf".into(),
            code: Some(2),
            stderr: "  open files limit  \n".into(),
        };
        assert_eq!(e.to_string(), "qpdf failed with exit code 2: open files limit");

        let e = ToolError::Failed {
            program: "tesseract".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "tesseract failed (terminated by signal)");
    }

    #[test]
    fn excerpt_truncates_long_stderr() {
        let long = "x".repeat(STDERR_EXCERPT + 50);
        let e = excerpt(&long);
        assert!(e.ends_with('\u{2026}'));
        assert_eq!(e.chars().count(), STDERR_EXCERPT + 1);
    }

    #[test]
    fn program_name_strips_directories() {
        let cmd = tool_command("/usr/local/bin/pdftoppm");
        assert_eq!(program_name(&cmd), "pdftoppm");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let cmd = tool_command("ocrpdf-definitely-not-installed");
        let err = run_tool(cmd).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let mut cmd = tool_command("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 3");
        match run_tool(cmd).await.unwrap_err() {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_returns_output() {
        let mut cmd = tool_command("sh");
        cmd.arg("-c").arg("printf ok");
        let out = run_tool(cmd).await.unwrap();
        assert_eq!(out.stdout, b"ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropped_run_kills_the_child() {
        let mut cmd = tool_command("sh");
        cmd.arg("-c").arg("sleep 5");
        let started = std::time::Instant::now();
        let res = tokio::time::timeout(std::time::Duration::from_millis(100), run_tool(cmd)).await;
        assert!(res.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
