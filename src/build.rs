//! Build runner collaborator
//!
//! The loop only consumes raw text output; exit status decides whether the
//! extractor even needs to look at it. The command-based runner enforces a
//! hard wall-clock budget and kills the build process when it expires.

use crate::error::BuildError;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Raw result of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub success: bool,
    /// Combined stdout and stderr, as produced by the tool.
    pub raw_output: String,
}

/// Seam to the external build system.
pub trait BuildRunner: Send + Sync {
    fn run(&self, project: &Path) -> Result<BuildOutput, BuildError>;
}

/// Runs a shell command in the project directory with a timeout.
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    command: String,
    timeout: Duration,
}

impl CommandBuildRunner {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl BuildRunner for CommandBuildRunner {
    fn run(&self, project: &Path) -> Result<BuildOutput, BuildError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.command).current_dir(project);

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::Spawn(e.to_string()))?;

        // Drain both pipes off-thread so a chatty build can't deadlock on a
        // full pipe while we poll for exit.
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::Spawn("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BuildError::Spawn("failed to capture stderr".to_string()))?;

        let out_handle = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::BufReader::new(stdout).read_to_end(&mut buf);
            buf
        });
        let err_handle = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::BufReader::new(stderr).read_to_end(&mut buf);
            buf
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BuildError::Timeout(self.timeout.as_secs()));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(BuildError::Spawn(e.to_string())),
            }
        };

        let stdout_bytes = out_handle.join().unwrap_or_default();
        let stderr_bytes = err_handle.join().unwrap_or_default();

        let mut raw_output = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr_text = String::from_utf8_lossy(&stderr_bytes);
        if !stderr_text.is_empty() {
            if !raw_output.is_empty() {
                raw_output.push('\n');
            }
            raw_output.push_str(&stderr_text);
        }

        Ok(BuildOutput {
            success: status.success(),
            raw_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandBuildRunner::new("echo hello", Duration::from_secs(5));
        let out = runner.run(dir.path()).unwrap();
        assert!(out.success);
        assert!(out.raw_output.contains("hello"));
    }

    #[test]
    fn test_failing_command_reports_failure_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandBuildRunner::new(
            "echo 'main.c:1:2: error: oops' >&2; exit 1",
            Duration::from_secs(5),
        );
        let out = runner.run(dir.path()).unwrap();
        assert!(!out.success);
        assert!(out.raw_output.contains("main.c:1:2: error: oops"));
    }

    #[test]
    fn test_timeout_kills_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandBuildRunner::new("sleep 30", Duration::from_millis(200));
        let start = Instant::now();
        let err = runner.run(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unstartable_shell_dir_reports_spawn_error() {
        let runner = CommandBuildRunner::new("true", Duration::from_secs(1));
        let err = runner.run(Path::new("/definitely/not/a/real/dir")).unwrap_err();
        assert!(matches!(err, BuildError::Spawn(_)));
    }
}
