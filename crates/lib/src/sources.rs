//! # Lead Sources
//!
//! The narrow seams between the sync pipeline and the remote call-center system.
//! Each trait covers one kind of lookup so the scraping technique behind it can be
//! replaced by a real API without touching pipeline logic.

use crate::types::CampaignList;
use async_trait::async_trait;
use std::collections::HashMap;
use tempfile::TempPath;
use thiserror::Error;

/// Errors raised by a lead source.
///
/// `Connection` is reserved for transport failures (DNS, refused connection,
/// timeouts). Everything the remote system answered, even with an error page,
/// is an application-level failure.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("could not reach the source system: {0}")]
    Connection(String),

    #[error("source returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse the source response: {0}")]
    Parse(String),

    #[error("local I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_connection(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }
}

/// Looks up campaign lists on the remote system.
#[async_trait]
pub trait ListProbe: Send + Sync {
    /// Returns the list if the remote system knows it, `None` when it does not.
    async fn probe(&self, list_id: &str) -> Result<Option<CampaignList>, SourceError>;

    /// Best-effort enumeration of every list id. An empty result means "unknown",
    /// and callers fall back to a candidate range.
    async fn enumerate(&self) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }
}

/// Finds the lead ids in one list that currently carry a status.
#[async_trait]
pub trait LeadSearch: Send + Sync {
    async fn search(&self, list: &CampaignList, status: &str) -> Result<Vec<String>, SourceError>;
}

/// Fetches the raw form fields of one lead.
#[async_trait]
pub trait LeadDetailFetch: Send + Sync {
    /// `Ok(None)` when the lead has no reachable detail view.
    async fn fetch(&self, lead_id: &str) -> Result<Option<HashMap<String, String>>, SourceError>;
}

/// A call recording as listed by the remote system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub file_name: String,
    pub url: String,
    /// How many files matched the phone number; only the chosen one is kept.
    pub candidates: usize,
}

/// Locates and downloads call recordings.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn find(&self, phone: &str) -> Result<Option<Recording>, SourceError>;

    /// Downloads into a temporary file which is deleted when the returned path is dropped.
    async fn download(&self, recording: &Recording) -> Result<TempPath, SourceError>;
}
