//! Remote command execution
//!
//! Runs a command line inside a located pod through the exec channel and
//! normalizes the outcome into a [`CommandResult`].

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use super::client::GatewaySession;
use super::error::{GatewayError, GatewayResult};
use super::types::{ExecOutput, PodReference};

/// Reason reported when a command does not finish in time
pub const TIMEOUT_REASON: &str = "timeout";

/// Why a command did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    NonZeroExit(i32),
    Transport,
}

/// Normalized outcome of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success { output: String },
    Failure { reason: String, kind: FailureKind },
}

impl CommandResult {
    fn from_output(output: ExecOutput) -> Self {
        if output.exit_code == 0 {
            // stderr chatter on a zero exit is not a failure
            return CommandResult::Success {
                output: output.stdout,
            };
        }

        let stderr = output.stderr.trim();
        let reason = if stderr.is_empty() {
            "command failed".to_string()
        } else {
            stderr.to_string()
        };

        CommandResult::Failure {
            reason,
            kind: FailureKind::NonZeroExit(output.exit_code),
        }
    }

    fn transport(reason: impl Into<String>) -> Self {
        CommandResult::Failure {
            reason: reason.into(),
            kind: FailureKind::Transport,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success { .. })
    }
}

/// Execute `command` in `pod`, abandoning it after `timeout`.
///
/// The remote process is not cancelled on timeout and the command is never
/// retried.
pub async fn exec(
    session: &GatewaySession,
    pod: &PodReference,
    command: &[String],
    timeout: Duration,
) -> CommandResult {
    let Some(program) = command.first() else {
        return CommandResult::transport("empty command");
    };

    let started = Instant::now();
    let result = tokio::time::timeout(timeout, session.control_plane().exec(pod, command)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Err(_) => {
            warn!(pod = %pod, program = %program, elapsed_ms, "Remote command timed out");
            CommandResult::Failure {
                reason: TIMEOUT_REASON.to_string(),
                kind: FailureKind::Timeout,
            }
        }
        Ok(Err(e)) => {
            warn!(pod = %pod, program = %program, error = %e, "Remote command transport failure");
            CommandResult::transport(e.to_string())
        }
        Ok(Ok(output)) => {
            debug!(
                pod = %pod,
                program = %program,
                exit_code = output.exit_code,
                elapsed_ms,
                "Remote command finished"
            );
            CommandResult::from_output(output)
        }
    }
}

/// kube-rs exec: attach stdout and stderr, read both to the end and collect
/// the exit status
pub(crate) async fn exec_in_pod(
    client: &Client,
    pod: &PodReference,
    command: &[String],
) -> GatewayResult<ExecOutput> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &pod.namespace);

    let attach_params = AttachParams::default()
        .stdin(false)
        .stdout(true)
        .stderr(true)
        .tty(false)
        .max_stdout_buf_size(1024 * 1024)
        .max_stderr_buf_size(1024 * 1024);

    let mut attached = pods
        .exec(&pod.pod_name, command.to_vec(), &attach_params)
        .await?;

    let stdout_reader = attached.stdout();
    let stderr_reader = attached.stderr();
    let status = attached.take_status();

    // Both pipes drain concurrently so a full stderr cannot stall stdout
    let (stdout, stderr) = tokio::join!(read_stream(stdout_reader), read_stream(stderr_reader));
    let (stdout, stderr) = (stdout?, stderr?);

    let status = match status {
        Some(status) => status.await,
        None => None,
    }
    .ok_or_else(|| GatewayError::ConnectionError("exec status channel closed".to_string()))?;

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code: exit_code_from_status(&status)?,
    })
}

/// A stream cut short is a transport fault, never a shorter output
async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> GatewayResult<String> {
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| GatewayError::ConnectionError(format!("exec stream interrupted: {}", e)))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Exit code carried by the exec channel's final status.
///
/// The process's own exit code arrives as a cause with reason `ExitCode`.
/// A failure without one never ran the command (container missing, exec
/// forbidden) and is returned as a connection error carrying its message.
fn exit_code_from_status(status: &Status) -> GatewayResult<i32> {
    if status.status.as_deref() == Some("Success") {
        return Ok(0);
    }

    let exit_code = status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse().ok());

    exit_code.ok_or_else(|| {
        let reason = status
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(status.reason.as_deref())
            .unwrap_or("remote command failed without a status");
        GatewayError::ConnectionError(reason.to_string())
    })
}
