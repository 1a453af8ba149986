//! # Lead Sync
//!
//! The best-effort enrichment pipeline: discover lists, discover leads, scrape
//! details, transcribe recordings, extract attributes, and persist after every
//! stage so partial progress survives a crash.

pub mod discovery;
pub mod guard;
pub mod pipeline;
pub mod report;

pub use discovery::{discover_lists, resolve_candidates, search_leads};
pub use guard::{SyncCoordinator, SyncPermit};
pub use pipeline::{LeadSyncPipeline, LeadSyncPipelineBuilder, SyncOptions};
pub use report::{ProgressCallback, SyncProgress, SyncReport};
