//! # Domain Types
//!
//! The records that flow through a sync run: the campaign lists discovered on the
//! call-center side and the lead records that are enriched and persisted locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Provenance tag stamped on records created by the sync.
pub const DEFAULT_SOURCE_TAG: &str = "vicidial";

/// Local pipeline stage given to freshly synced leads.
pub const DEFAULT_STAGE: &str = "new";

/// One call list on the remote system. Discovered fresh on every run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignList {
    pub id: String,
    pub name: String,
    pub campaign: String,
    pub active: bool,
}

/// Where a lead's call transcript currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "pending",
            TranscriptStatus::Processing => "processing",
            TranscriptStatus::Completed => "completed",
            TranscriptStatus::Failed => "failed",
        }
    }

    /// Whether `self -> next` is a legal move.
    ///
    /// `Failed -> Processing` is only taken on a later run that retries failed
    /// transcripts; within one run the pipeline never attempts a lead twice.
    pub fn can_transition_to(&self, next: TranscriptStatus) -> bool {
        use TranscriptStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptStatus::Completed | TranscriptStatus::Failed)
    }
}

impl fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TranscriptStatus {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranscriptStatus::Pending),
            "processing" => Ok(TranscriptStatus::Processing),
            "completed" => Ok(TranscriptStatus::Completed),
            "failed" => Ok(TranscriptStatus::Failed),
            other => Err(LeadError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LeadError {
    #[error("transcript status cannot move from {from} to {to}")]
    InvalidTransition {
        from: TranscriptStatus,
        to: TranscriptStatus,
    },
    #[error("unknown transcript status: {0}")]
    UnknownStatus(String),
}

/// A lead as it is stored locally, accumulated across every enrichment stage.
///
/// The whole record is written on every save, so callers must always hand the
/// store the latest accumulated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub id: String,
    pub lead_id: String,

    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,

    pub status: String,
    pub stage: String,
    pub source: String,
    pub list_id: String,
    pub list_name: String,
    pub campaign: String,
    pub vendor_code: String,

    pub dot_number: String,
    pub mc_number: String,
    pub fleet_size: u32,
    pub operating_states: Vec<String>,
    pub current_carrier: String,
    pub commodity_hauled: String,
    pub premium: Option<f64>,
    pub comments: String,

    pub transcript_text: Option<String>,
    pub call_transcript: String,
    transcript_status: TranscriptStatus,
    pub has_transcript: bool,
    pub recording_file: Option<String>,

    /// Attributes merged in from structured extraction. Keys are never removed.
    #[serde(default)]
    pub extracted: BTreeMap<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// Derives the local id for a remote lead. Stable across re-syncs.
    pub fn local_id_for(lead_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("vicidial:{lead_id}").as_bytes()).to_string()
    }

    /// A blank record for `lead_id` with a pending transcript.
    pub fn new(lead_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::local_id_for(lead_id),
            lead_id: lead_id.to_string(),
            name: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            email: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip: String::new(),
            status: String::new(),
            stage: DEFAULT_STAGE.to_string(),
            source: DEFAULT_SOURCE_TAG.to_string(),
            list_id: String::new(),
            list_name: String::new(),
            campaign: String::new(),
            vendor_code: String::new(),
            dot_number: String::new(),
            mc_number: String::new(),
            fleet_size: 0,
            operating_states: Vec::new(),
            current_carrier: String::new(),
            commodity_hauled: String::new(),
            premium: None,
            comments: String::new(),
            transcript_text: None,
            call_transcript: String::new(),
            transcript_status: TranscriptStatus::Pending,
            has_transcript: false,
            recording_file: None,
            extracted: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transcript_status(&self) -> TranscriptStatus {
        self.transcript_status
    }

    /// Moves the transcript to `next`, rejecting any illegal transition.
    pub fn advance_transcript(&mut self, next: TranscriptStatus) -> Result<(), LeadError> {
        if !self.transcript_status.can_transition_to(next) {
            return Err(LeadError::InvalidTransition {
                from: self.transcript_status,
                to: next,
            });
        }
        self.transcript_status = next;
        self.touch();
        Ok(())
    }

    /// Records a successful transcript. The record must be `Processing`.
    pub fn complete_transcript(&mut self, transcript: String) -> Result<(), LeadError> {
        self.advance_transcript(TranscriptStatus::Completed)?;
        self.call_transcript = transcript.clone();
        self.transcript_text = Some(transcript);
        self.has_transcript = true;
        Ok(())
    }

    /// Records a failed attempt with a human readable note. The record must be `Processing`.
    pub fn fail_transcript(&mut self, note: impl Into<String>) -> Result<(), LeadError> {
        self.advance_transcript(TranscriptStatus::Failed)?;
        if !self.has_transcript {
            self.call_transcript = note.into();
        }
        Ok(())
    }

    /// Full name when known, otherwise the display name.
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.name.clone()
        } else {
            full.to_string()
        }
    }

    /// Merges structured-extraction output. Existing keys are overwritten,
    /// none are removed, and well-known keys fill empty domain fields.
    pub fn merge_extracted(&mut self, attributes: BTreeMap<String, Value>) {
        for (key, value) in &attributes {
            match key.as_str() {
                "premium" if self.premium.is_none() => {
                    self.premium = value_as_f64(value);
                }
                "dot_number" if self.dot_number.is_empty() => {
                    self.dot_number = value_as_string(value);
                }
                "mc_number" if self.mc_number.is_empty() => {
                    self.mc_number = value_as_string(value);
                }
                "fleet_size" if self.fleet_size == 0 => {
                    self.fleet_size = value_as_f64(value).map(|n| n as u32).unwrap_or(0);
                }
                "current_carrier" if self.current_carrier.is_empty() => {
                    self.current_carrier = value_as_string(value);
                }
                "commodity" | "commodity_hauled" if self.commodity_hauled.is_empty() => {
                    self.commodity_hauled = value_as_string(value);
                }
                "operating_states" if self.operating_states.is_empty() => {
                    self.operating_states = match value {
                        Value::Array(items) => items.iter().map(value_as_string).collect(),
                        other => value_as_string(other)
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect(),
                    };
                }
                _ => {}
            }
        }
        self.extracted.extend(attributes);
        self.touch();
    }

    /// Carries enrichment from a previously stored version of the same lead into
    /// this freshly scraped one, so a re-sync never loses or regresses anything.
    pub fn carry_forward(&mut self, previous: &LeadRecord) {
        self.created_at = previous.created_at;
        if self.stage == DEFAULT_STAGE && previous.stage != DEFAULT_STAGE {
            self.stage = previous.stage.clone();
        }

        if previous.transcript_status != TranscriptStatus::Pending
            && self.transcript_status == TranscriptStatus::Pending
        {
            self.adopt_transcript(previous);
        }
        // A stored Processing means an earlier run died mid-stage.
        if self.transcript_status == TranscriptStatus::Processing {
            self.transcript_status = TranscriptStatus::Failed;
            if self.call_transcript.is_empty() {
                self.call_transcript = "Transcription was interrupted".to_string();
            }
        }

        let mut extracted = previous.extracted.clone();
        extracted.append(&mut self.extracted);
        self.extracted = extracted;

        if self.premium.is_none() {
            self.premium = previous.premium;
        }
        if self.dot_number.is_empty() {
            self.dot_number = previous.dot_number.clone();
        }
        if self.mc_number.is_empty() {
            self.mc_number = previous.mc_number.clone();
        }
        if self.fleet_size == 0 {
            self.fleet_size = previous.fleet_size;
        }
        if self.operating_states.is_empty() {
            self.operating_states = previous.operating_states.clone();
        }
        if self.current_carrier.is_empty() {
            self.current_carrier = previous.current_carrier.clone();
        }
        if self.commodity_hauled.is_empty() {
            self.commodity_hauled = previous.commodity_hauled.clone();
        }
    }

    /// Keeps a stored completed transcript when `self` would regress it.
    /// Returns true when the stored transcript was restored.
    pub fn protect_completed_transcript(&mut self, stored: &LeadRecord) -> bool {
        if stored.transcript_status == TranscriptStatus::Completed
            && self.transcript_status != TranscriptStatus::Completed
        {
            self.adopt_transcript(stored);
            return true;
        }
        false
    }

    fn adopt_transcript(&mut self, previous: &LeadRecord) {
        self.transcript_status = previous.transcript_status;
        self.transcript_text = previous.transcript_text.clone();
        self.call_transcript = previous.call_transcript.clone();
        self.has_transcript = previous.has_transcript;
        self.recording_file = previous.recording_file.clone();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_id_is_stable() {
        assert_eq!(LeadRecord::local_id_for("501"), LeadRecord::local_id_for("501"));
        assert_ne!(LeadRecord::local_id_for("501"), LeadRecord::local_id_for("502"));
    }

    #[test]
    fn transcript_transitions_follow_the_lifecycle() {
        let mut lead = LeadRecord::new("1");
        assert_eq!(
            lead.advance_transcript(TranscriptStatus::Completed),
            Err(LeadError::InvalidTransition {
                from: TranscriptStatus::Pending,
                to: TranscriptStatus::Completed
            })
        );
        lead.advance_transcript(TranscriptStatus::Processing).unwrap();
        lead.complete_transcript("hello".into()).unwrap();
        assert!(lead.has_transcript);
        assert!(lead.advance_transcript(TranscriptStatus::Pending).is_err());
        assert!(lead.advance_transcript(TranscriptStatus::Failed).is_err());
        assert!(lead.advance_transcript(TranscriptStatus::Processing).is_err());
    }

    #[test]
    fn failed_note_does_not_overwrite_real_transcript() {
        let mut lead = LeadRecord::new("1");
        lead.advance_transcript(TranscriptStatus::Processing).unwrap();
        lead.fail_transcript("No recording found for phone 5551234567").unwrap();
        assert_eq!(lead.call_transcript, "No recording found for phone 5551234567");
        assert_eq!(lead.transcript_status(), TranscriptStatus::Failed);
    }

    #[test]
    fn merge_extracted_is_additive_and_fills_empty_fields() {
        let mut lead = LeadRecord::new("1");
        lead.dot_number = "1234567".into();
        let mut attrs = BTreeMap::new();
        attrs.insert("premium".to_string(), json!("$12,500.00"));
        attrs.insert("dot_number".to_string(), json!("999"));
        attrs.insert("operating_states".to_string(), json!(["TX", "OK"]));
        lead.merge_extracted(attrs);

        let mut more = BTreeMap::new();
        more.insert("fleet_size".to_string(), json!(7));
        lead.merge_extracted(more);

        assert_eq!(lead.premium, Some(12500.0));
        assert_eq!(lead.dot_number, "1234567");
        assert_eq!(lead.operating_states, vec!["TX", "OK"]);
        assert_eq!(lead.fleet_size, 7);
        assert_eq!(lead.extracted.len(), 4);
    }

    #[test]
    fn carry_forward_keeps_completed_transcript() {
        let mut stored = LeadRecord::new("7");
        stored.advance_transcript(TranscriptStatus::Processing).unwrap();
        stored.complete_transcript("we haul steel".into()).unwrap();
        stored.extracted.insert("premium".into(), json!(900));

        let mut fresh = LeadRecord::new("7");
        fresh.extracted.insert("new_key".into(), json!(true));
        fresh.carry_forward(&stored);

        assert_eq!(fresh.transcript_status(), TranscriptStatus::Completed);
        assert_eq!(fresh.transcript_text.as_deref(), Some("we haul steel"));
        assert!(fresh.extracted.contains_key("premium"));
        assert!(fresh.extracted.contains_key("new_key"));
        assert_eq!(fresh.created_at, stored.created_at);
    }

    #[test]
    fn serializes_camel_case_with_lowercase_status() {
        let lead = LeadRecord::new("501");
        let value = serde_json::to_value(&lead).unwrap();
        assert_eq!(value["leadId"], json!("501"));
        assert_eq!(value["transcriptStatus"], json!("pending"));
    }
}
