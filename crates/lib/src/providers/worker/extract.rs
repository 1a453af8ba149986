use super::{run_json_worker, AttributeExtractor, WorkerError, WorkerSpec};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The lead context handed to the extraction worker alongside the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadContext {
    pub lead_id: String,
    pub phone: String,
    pub full_name: String,
    pub city: String,
    pub vendor_code: String,
}

/// An attribute extractor backed by an external LLM script.
///
/// The request goes over stdin as
/// `{"transcript": "...", "lead_info": {"lead_id", "phone", "full_name", "city", "vendor_code"}}`
/// so transcript size and quoting never hit argv limits. The reply is one JSON
/// object, either `{"success": true, "data": {...}}` or a flat object of attributes.
#[derive(Debug, Clone)]
pub struct WorkerExtractor {
    spec: WorkerSpec,
}

impl WorkerExtractor {
    pub fn new(spec: WorkerSpec) -> Self {
        Self { spec }
    }
}

fn attributes_from_response(value: Value) -> Result<BTreeMap<String, Value>, WorkerError> {
    let Value::Object(mut object) = value else {
        return Err(WorkerError::MalformedOutput("expected an object".to_string()));
    };

    let success = object
        .remove("success")
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(true);
    let error = object.remove("error");
    if !success {
        let reason = error
            .and_then(|e| e.as_str().map(str::to_string))
            .unwrap_or_else(|| "extraction failed".to_string());
        return Err(WorkerError::Rejected(reason));
    }

    let attributes = match object.remove("data") {
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(WorkerError::MalformedOutput(format!(
                "`data` must be an object, got {other}"
            )))
        }
        None => object,
    };
    Ok(attributes
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .collect())
}

#[async_trait]
impl AttributeExtractor for WorkerExtractor {
    async fn extract(
        &self,
        transcript: &str,
        lead: &LeadContext,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, WorkerError> {
        info!(lead_id = %lead.lead_id, "extracting structured attributes");
        let payload = serde_json::to_vec(&json!({
            "transcript": transcript,
            "lead_info": lead,
        }))
        .map_err(|e| WorkerError::MalformedOutput(e.to_string()))?;

        let value = run_json_worker(&self.spec, &[], Some(&payload), cancel).await?;
        let attributes = attributes_from_response(value)?;
        debug!(lead_id = %lead.lead_id, count = attributes.len(), "extracted attributes");
        Ok(attributes)
    }
}
