//! # External Workers
//!
//! Transcription and structured extraction run as out-of-process workers that
//! speak JSON over stdio. Both are driven through [`run_json_worker`], a bounded
//! external task: it is killed when its timeout elapses or its cancellation token
//! fires, and it never outlives the call.

pub mod extract;
pub mod transcribe;

pub use extract::{LeadContext, WorkerExtractor};
pub use transcribe::WorkerTranscriber;

use crate::types::LeadRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on the stderr tail carried in errors.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to start worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("worker I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("worker timed out after {after:?} and was killed")]
    Timeout { after: Duration },
    #[error("worker was cancelled")]
    Cancelled,
    #[error("worker exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("worker output is not a JSON object: {0}")]
    MalformedOutput(String),
    #[error("worker reported failure: {0}")]
    Rejected(String),
}

/// How to launch one kind of worker.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl WorkerSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

enum Outcome {
    Finished(Result<Value, WorkerError>),
    TimedOut,
    Cancelled,
}

async fn write_stdin(stdin: Option<ChildStdin>, payload: Option<&[u8]>) -> io::Result<()> {
    let (Some(mut stdin), Some(payload)) = (stdin, payload) else {
        return Ok(());
    };
    match stdin.write_all(payload).await {
        // The worker may exit without reading its input; its exit status tells the story.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
    // Dropping `stdin` closes the pipe so the worker sees EOF.
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text.len().saturating_sub(STDERR_TAIL_BYTES);
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

/// Parses the last non-empty line of `stdout` as a JSON object.
pub fn parse_final_json_line(stdout: &str) -> Result<Value, WorkerError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| WorkerError::MalformedOutput("empty output".to_string()))?;
    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(WorkerError::MalformedOutput(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(WorkerError::MalformedOutput(e.to_string())),
    }
}

/// Runs a worker to completion and returns the JSON object on its final stdout line.
///
/// `extra_args` are appended after the configured arguments. `stdin_payload`, when
/// given, is written to the worker's stdin which is then closed.
pub async fn run_json_worker(
    spec: &WorkerSpec,
    extra_args: &[OsString],
    stdin_payload: Option<&[u8]>,
    cancel: &CancellationToken,
) -> Result<Value, WorkerError> {
    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra_args)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| WorkerError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
    debug!(program = %spec.program, pid = ?child.id(), "worker started");

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = {
        let exchange = async {
            let (written, out, err) = tokio::join!(
                write_stdin(stdin, stdin_payload),
                read_all(stdout),
                read_all(stderr)
            );
            written?;
            let (out, err) = (out?, err?);
            let status = child.wait().await?;
            if !status.success() {
                return Err(WorkerError::ExitStatus {
                    code: status.code(),
                    stderr: stderr_tail(&err),
                });
            }
            parse_final_json_line(&String::from_utf8_lossy(&out))
        };

        tokio::select! {
            result = exchange => Outcome::Finished(result),
            _ = tokio::time::sleep(spec.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        }
    };

    match outcome {
        Outcome::Finished(result) => result,
        Outcome::TimedOut => {
            warn!(program = %spec.program, timeout = ?spec.timeout, "worker timed out, killing it");
            if let Err(e) = child.kill().await {
                warn!(program = %spec.program, "failed to kill timed out worker: {e}");
            }
            Err(WorkerError::Timeout {
                after: spec.timeout,
            })
        }
        Outcome::Cancelled => {
            if let Err(e) = child.kill().await {
                warn!(program = %spec.program, "failed to kill cancelled worker: {e}");
            }
            Err(WorkerError::Cancelled)
        }
    }
}

/// Produces a transcript for an audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, WorkerError>;
}

/// Pulls structured attributes out of a transcript.
#[async_trait]
pub trait AttributeExtractor: Send + Sync {
    async fn extract(
        &self,
        transcript: &str,
        lead: &LeadContext,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, WorkerError>;
}

impl From<&LeadRecord> for LeadContext {
    fn from(lead: &LeadRecord) -> Self {
        Self {
            lead_id: lead.lead_id.clone(),
            phone: lead.phone.clone(),
            full_name: lead.full_name(),
            city: lead.city.clone(),
            vendor_code: lead.vendor_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn final_line_wins() {
        let out = "loading model...\nprogress 50%\n{\"success\":true,\"transcript\":\"hi\"}\n\n";
        assert_eq!(
            parse_final_json_line(out).unwrap(),
            json!({"success": true, "transcript": "hi"})
        );
    }

    #[test]
    fn non_object_and_garbage_are_malformed() {
        assert!(matches!(
            parse_final_json_line("[1,2]"),
            Err(WorkerError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_final_json_line("Traceback (most recent call last)"),
            Err(WorkerError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_final_json_line("   \n"),
            Err(WorkerError::MalformedOutput(_))
        ));
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let long = "x".repeat(STDERR_TAIL_BYTES * 2);
        assert_eq!(stderr_tail(long.as_bytes()).len(), STDERR_TAIL_BYTES);
    }
}
