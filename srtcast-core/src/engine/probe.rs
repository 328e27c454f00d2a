//! Bounded engine probes

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

use crate::error::{Result, SrtcastError};

/// Captured result of one probe run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    /// Successful exit with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs a short-lived engine command to completion
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Run `program args..`, failing with `Timeout` once `timeout` elapses
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<ProbeOutput>;
}

/// Probe runner backed by real subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbeRunner;

#[async_trait]
impl ProbeRunner for SystemProbeRunner {
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<ProbeOutput> {
        trace!("Probing {} {}", program.display(), args.join(" "));

        // kill_on_drop reaps the child when the timeout cancels the wait
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProbeOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SrtcastError::timeout(format!(
                "{} {} did not finish within {} ms",
                program.display(),
                args.join(" "),
                timeout.as_millis()
            ))),
        }
    }
}
