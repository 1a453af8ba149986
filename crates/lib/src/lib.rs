//! # Lead Sync
//!
//! Core of the CRM's call-center lead sync: domain records, the source seams the
//! scraper plugs into, out-of-process transcription and extraction workers, the
//! SQLite lead store, and the orchestrating pipeline.

pub mod errors;
pub mod normalize;
pub mod providers;
pub mod sources;
pub mod sync;
pub mod types;

pub use errors::SyncError;
pub use providers::db::{LeadStore, SaveOutcome, SqliteLeadStore, StoreError};
pub use providers::worker::{
    AttributeExtractor, LeadContext, Transcriber, WorkerError, WorkerExtractor, WorkerSpec,
    WorkerTranscriber,
};
pub use sources::{LeadDetailFetch, LeadSearch, ListProbe, Recording, RecordingSource, SourceError};
pub use sync::{
    LeadSyncPipeline, ProgressCallback, SyncCoordinator, SyncOptions, SyncProgress, SyncReport,
};
pub use types::{CampaignList, LeadError, LeadRecord, TranscriptStatus, DEFAULT_SOURCE_TAG};
