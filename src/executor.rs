//! Remote command execution over SSH
//!
//! One executor runs one configured command line on one host and reports the
//! outcome as data. Every failure mode is folded into [`ExecFailure`] so the
//! poller can treat success and failure uniformly; nothing propagates past
//! this boundary as a process-level fault.
//!
//! Authentication is delegated entirely to the local `ssh` client and its
//! key/agent setup. The executor only consumes the resulting exit status.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::config::HostConfig;

/// Result of one remote execution attempt.
pub type ExecOutcome = Result<String, ExecFailure>;

/// Why a remote execution produced no usable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFailure {
    /// Connection or authentication failed before the command could run.
    Unreachable(String),

    /// The command ran on the host but signaled an error.
    CommandFailed(String),

    /// The execution budget was exceeded; the attempt was killed.
    Timeout,
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecFailure::Unreachable(msg) => write!(f, "unreachable: {}", msg),
            ExecFailure::CommandFailed(msg) => write!(f, "{}", msg),
            ExecFailure::Timeout => write!(f, "timed out"),
        }
    }
}

/// Seam between the poller and the transport.
///
/// Production uses [`SshExecutor`]; tests substitute scripted executors.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self) -> ExecOutcome;
}

/// Executes the configured command through the local `ssh` client.
pub struct SshExecutor {
    host: HostConfig,
    timeout: Duration,
    verify_host: bool,
}

impl SshExecutor {
    pub fn new(host: HostConfig, timeout: Duration, verify_host: bool) -> Self {
        Self {
            host,
            timeout,
            verify_host,
        }
    }

    /// Argument vector passed to `ssh`. The remote command is a single
    /// argument so the remote shell handles pipes and quoting.
    fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-T".to_string(),
        ];

        if !self.verify_host {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
            args.push("-o".to_string());
            args.push("UserKnownHostsFile=/dev/null".to_string());
        }

        args.push("-p".to_string());
        args.push(self.host.port.to_string());

        let target = match &self.host.user {
            Some(user) => format!("{}@{}", user, self.host.hostname),
            None => self.host.hostname.clone(),
        };
        args.push(target);
        args.push(self.host.command.clone());

        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self) -> ExecOutcome {
        let args = self.ssh_args();
        trace!(host = %self.host.hostname, "running ssh {}", args.join(" "));

        let child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return Err(ExecFailure::Unreachable(format!(
                    "failed to spawn ssh: {e}"
                )));
            }
        };

        // On timeout the future is dropped and kill_on_drop reaps the child,
        // keeping shutdown bounded by the execution budget.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecFailure::Unreachable(format!("ssh I/O error: {e}"))),
            Err(_) => return Err(ExecFailure::Timeout),
        };

        classify_output(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Map an ssh exit status to the failure taxonomy.
///
/// `ssh` reserves exit code 255 for its own connection and authentication
/// failures; anything else is the remote command's exit status.
fn classify_output(code: Option<i32>, stdout: &str, stderr: &str) -> ExecOutcome {
    match code {
        Some(0) => Ok(stdout.trim_end().to_string()),
        Some(255) => Err(ExecFailure::Unreachable(first_line(stderr).to_string())),
        Some(code) => Err(ExecFailure::CommandFailed(format!(
            "[Error {code}] {}",
            first_line(stderr)
        ))),
        None => Err(ExecFailure::CommandFailed(
            "terminated by signal".to_string(),
        )),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim_end()
}
