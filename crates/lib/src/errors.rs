use crate::providers::db::storage::StoreError;
use crate::sources::SourceError;
use thiserror::Error;

/// Pipeline-level failures. Anything not listed here is handled inside the run
/// as a per-lead or per-stage soft failure.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("the source system is unreachable: every list probe failed ({0})")]
    SourceUnreachable(SourceError),
    #[error("a sync is already running for scope '{0}'")]
    AlreadyRunning(String),
    #[error("the sync was cancelled")]
    Cancelled,
    #[error("the pipeline is missing its {0}")]
    MissingComponent(&'static str),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
