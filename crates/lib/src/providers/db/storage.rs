use crate::types::LeadRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to the lead store: {0}")]
    Connection(String),
    #[error("lead store operation failed: {0}")]
    Database(#[from] turso::Error),
    #[error("failed to (de)serialize a lead record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a save did to the stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    /// The stored record already matched; nothing was written.
    Unchanged,
}

/// Durable storage for lead records.
///
/// A save replaces the whole stored record for its `id`, so a later `get` returns
/// exactly the last value saved. Implementations must refuse to regress a
/// completed transcript.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn save(&self, record: &LeadRecord) -> Result<SaveOutcome, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<LeadRecord>, StoreError>;

    /// All stored records, most recently updated first.
    async fn list(&self) -> Result<Vec<LeadRecord>, StoreError>;
}
