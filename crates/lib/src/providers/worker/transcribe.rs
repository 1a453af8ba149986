use super::{run_json_worker, Transcriber, WorkerError, WorkerSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Deserialize, Debug)]
struct TranscriptionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A transcriber backed by an external speech-to-text process.
///
/// The audio path is passed as the last argument. The final stdout line must be
/// `{"success": true, "transcript": "..."}`; anything else counts as a failure.
#[derive(Debug, Clone)]
pub struct WorkerTranscriber {
    spec: WorkerSpec,
}

impl WorkerTranscriber {
    pub fn new(spec: WorkerSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Transcriber for WorkerTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, WorkerError> {
        info!(audio = %audio.display(), "transcribing recording");
        let value = run_json_worker(&self.spec, &[audio.as_os_str().to_owned()], None, cancel).await?;
        let response: TranscriptionResponse = serde_json::from_value(value)
            .map_err(|e| WorkerError::MalformedOutput(e.to_string()))?;

        match response.transcript {
            Some(text) if response.success && !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(WorkerError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "no transcript returned".to_string()),
            )),
        }
    }
}
