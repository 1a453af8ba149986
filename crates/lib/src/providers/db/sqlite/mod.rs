use crate::providers::db::storage::{LeadStore, SaveOutcome, StoreError};
use crate::types::LeadRecord;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use tracing::{debug, info, warn};
use turso::{params, Connection, Database};

pub mod sql;

/// A lead store backed by a local SQLite database through Turso.
///
/// Each lead is one row keyed by its local id; the full record lives in the `data`
/// column as JSON, with a few columns copied out for querying. Clones share the
/// same underlying database.
#[derive(Clone)]
pub struct SqliteLeadStore {
    db: Database,
}

impl SqliteLeadStore {
    /// Opens (or creates) the database at `db_path` and ensures the schema exists.
    ///
    /// Use ":memory:" for an isolated in-memory database.
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        // PRAGMA returns a row, so it has to go through `query`.
        conn.query("PRAGMA journal_mode=WAL;", ())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { db };
        store.initialize_schema().await?;
        info!(db_path, "lead store ready");
        Ok(store)
    }

    /// Wraps an already opened database. The schema is created if missing.
    pub async fn from_database(db: Database) -> Result<Self, StoreError> {
        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Idempotent; safe to call on every start.
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        for statement in sql::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        self.db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn fetch_by_id(
        conn: &Connection,
        id: &str,
    ) -> Result<Option<LeadRecord>, StoreError> {
        let mut rows = conn.query(sql::SELECT_LEAD_DATA_BY_ID, params![id]).await?;
        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}

impl Debug for SqliteLeadStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteLeadStore").finish_non_exhaustive()
    }
}

impl AsRef<Database> for SqliteLeadStore {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn save(&self, record: &LeadRecord) -> Result<SaveOutcome, StoreError> {
        let conn = self.connect()?;
        let stored = Self::fetch_by_id(&conn, &record.id).await?;

        let mut record = record.clone();
        let Some(stored) = stored else {
            let data = serde_json::to_string(&record)?;
            conn.execute(
                sql::INSERT_LEAD,
                params![
                    record.id.as_str(),
                    record.lead_id.as_str(),
                    record.phone.as_str(),
                    record.transcript_status().as_str(),
                    data,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339()
                ],
            )
            .await?;
            debug!(id = %record.id, lead_id = %record.lead_id, "inserted lead");
            return Ok(SaveOutcome::Inserted);
        };

        if record.protect_completed_transcript(&stored) {
            warn!(
                id = %record.id,
                "refusing to regress a completed transcript; keeping the stored one"
            );
        }
        record.created_at = stored.created_at;
        let touched_at = record.updated_at;
        record.updated_at = stored.updated_at;
        if record == stored {
            return Ok(SaveOutcome::Unchanged);
        }
        record.updated_at = touched_at;

        let data = serde_json::to_string(&record)?;
        conn.execute(
            sql::UPDATE_LEAD,
            params![
                record.lead_id.as_str(),
                record.phone.as_str(),
                record.transcript_status().as_str(),
                data,
                record.updated_at.to_rfc3339(),
                record.id.as_str()
            ],
        )
        .await?;
        debug!(id = %record.id, status = %record.transcript_status(), "updated lead");
        Ok(SaveOutcome::Updated)
    }

    async fn get(&self, id: &str) -> Result<Option<LeadRecord>, StoreError> {
        let conn = self.connect()?;
        Self::fetch_by_id(&conn, id).await
    }

    async fn list(&self) -> Result<Vec<LeadRecord>, StoreError> {
        let conn = self.connect()?;
        let mut rows = conn.query(sql::SELECT_ALL_LEAD_DATA, ()).await?;
        let mut leads = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            leads.push(serde_json::from_str(&data)?);
        }
        Ok(leads)
    }
}
