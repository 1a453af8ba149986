//! # SQLite Specific SQL Queries
//!
//! Statements for the lead store, kept apart from the provider logic.

pub const CREATE_LEADS_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        lead_id TEXT NOT NULL,
        phone TEXT,
        transcript_status TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

pub const CREATE_LEADS_LEAD_ID_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_leads_lead_id ON leads (lead_id);";

/// Every statement needed to bring an empty database up to date, in order.
pub const ALL_TABLE_CREATION_SQL: &[&str] =
    &[CREATE_LEADS_TABLE_SQL, CREATE_LEADS_LEAD_ID_INDEX_SQL];

pub const SELECT_LEAD_DATA_BY_ID: &str = "SELECT data FROM leads WHERE id = ?";

pub const SELECT_ALL_LEAD_DATA: &str = "SELECT data FROM leads ORDER BY updated_at DESC, id";

pub const INSERT_LEAD: &str = "
    INSERT INTO leads (id, lead_id, phone, transcript_status, data, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

pub const UPDATE_LEAD: &str = "
    UPDATE leads
    SET lead_id = ?, phone = ?, transcript_status = ?, data = ?, updated_at = ?
    WHERE id = ?
";
