//! # leadsync-vicidial: ViciDial Lead Source
//!
//! This crate implements the `leadsync` source seams (`ListProbe`, `LeadSearch`,
//! `LeadDetailFetch`, `RecordingSource`) against a ViciDial server. List metadata
//! comes from the non-agent API; everything else is scraped from the admin pages
//! and the recordings directory listing.

pub mod parse;
pub mod session;
mod source;

pub use session::{VicidialConfig, VicidialSession};

use leadsync::SourceError;
use thiserror::Error;

// --- Error Definitions ---

#[derive(Error, Debug)]
pub enum VicidialError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ViciDial returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid ViciDial configuration: {0}")]
    Config(String),
    #[error("Unexpected ViciDial response: {0}")]
    Parse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VicidialError {
    /// True for transport failures: refused, reset or dropped connections and
    /// timeouts. Non-2xx answers arrive as [`VicidialError::Status`] instead.
    pub fn is_connection(&self) -> bool {
        matches!(self, VicidialError::Http(e) if e.status().is_none())
    }
}

impl From<VicidialError> for SourceError {
    fn from(err: VicidialError) -> Self {
        if err.is_connection() {
            return SourceError::Connection(err.to_string());
        }
        match err {
            VicidialError::Status { status, body } => SourceError::Status { status, body },
            VicidialError::Io(e) => SourceError::Io(e),
            VicidialError::Config(msg) => SourceError::Connection(msg),
            VicidialError::Http(e) => match e.status() {
                Some(status) => SourceError::Status {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => SourceError::Connection(e.to_string()),
            },
            VicidialError::Parse(msg) => SourceError::Parse(msg),
        }
    }
}
