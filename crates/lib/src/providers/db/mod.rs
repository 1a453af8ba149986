pub mod sqlite;
pub mod storage;

pub use sqlite::SqliteLeadStore;
pub use storage::{LeadStore, SaveOutcome, StoreError};
