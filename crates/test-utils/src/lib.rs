use anyhow::Result;
use async_trait::async_trait;
use leadsync::{
    AttributeExtractor, CampaignList, LeadContext, LeadDetailFetch, LeadRecord, LeadSearch,
    LeadStore, ListProbe, Recording, RecordingSource, SaveOutcome, SourceError, SqliteLeadStore,
    StoreError, Transcriber, TranscriptStatus, WorkerError,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tokio_util::sync::CancellationToken;

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub db: turso::Database,
    pub store: SqliteLeadStore,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database with the lead schema.
    pub async fn new() -> Result<Self> {
        let db = turso::Builder::new_local(":memory:").build().await?;
        let store = SqliteLeadStore::from_database(db.clone()).await?;
        Ok(Self { db, store })
    }
}

pub fn campaign_list(id: &str, active: bool) -> CampaignList {
    CampaignList {
        id: id.to_string(),
        name: format!("List {id}"),
        campaign: "TRUCKS".to_string(),
        active,
    }
}

// --- Mock Store ---

/// An in-memory `LeadStore` that keeps every write for later assertions.
#[derive(Clone, Default)]
pub struct RecordingStore {
    current: Arc<Mutex<HashMap<String, LeadRecord>>>,
    history: Arc<Mutex<Vec<LeadRecord>>>,
    failing_leads: Arc<Mutex<HashSet<String>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save of `lead_id` will fail with a connection error.
    pub fn fail_saves_for(&self, lead_id: &str) {
        self.failing_leads.lock().unwrap().insert(lead_id.to_string());
    }

    /// Pre-populates the store as if an earlier run had saved `record`.
    pub fn seed(&self, record: LeadRecord) {
        self.current
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn latest(&self, lead_id: &str) -> Option<LeadRecord> {
        self.current
            .lock()
            .unwrap()
            .get(&LeadRecord::local_id_for(lead_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.current.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The transcript status of every write of `lead_id`, in order, with
    /// consecutive duplicates collapsed.
    pub fn status_history(&self, lead_id: &str) -> Vec<TranscriptStatus> {
        let mut statuses: Vec<TranscriptStatus> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.lead_id == lead_id)
            .map(|r| r.transcript_status())
            .collect();
        statuses.dedup();
        statuses
    }

    pub fn saves_for(&self, lead_id: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.lead_id == lead_id)
            .count()
    }
}

#[async_trait]
impl LeadStore for RecordingStore {
    async fn save(&self, record: &LeadRecord) -> Result<SaveOutcome, StoreError> {
        if self.failing_leads.lock().unwrap().contains(&record.lead_id) {
            return Err(StoreError::Connection("simulated write failure".to_string()));
        }
        self.history.lock().unwrap().push(record.clone());
        let previous = self
            .current
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(match previous {
            None => SaveOutcome::Inserted,
            Some(prev) if &prev == record => SaveOutcome::Unchanged,
            Some(_) => SaveOutcome::Updated,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<LeadRecord>, StoreError> {
        Ok(self.current.lock().unwrap().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<LeadRecord>, StoreError> {
        Ok(self.current.lock().unwrap().values().cloned().collect())
    }
}

// --- Mock Source ---

/// A scripted call-center source covering all four source seams.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    lists: Arc<Mutex<HashMap<String, Result<CampaignList, String>>>>,
    unreachable: Arc<Mutex<bool>>,
    leads: Arc<Mutex<HashMap<String, Vec<String>>>>,
    details: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
    recordings: Arc<Mutex<HashMap<String, Vec<String>>>>,
    downloads: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(self, list: CampaignList) -> Self {
        self.lists
            .lock()
            .unwrap()
            .insert(list.id.clone(), Ok(list));
        self
    }

    /// Probing `list_id` answers with an application-level error.
    pub fn with_list_error(self, list_id: &str) -> Self {
        self.lists
            .lock()
            .unwrap()
            .insert(list_id.to_string(), Err("ERROR: list_info INVALID".to_string()));
        self
    }

    /// Every probe fails to connect.
    pub fn unreachable(self) -> Self {
        *self.unreachable.lock().unwrap() = true;
        self
    }

    pub fn with_leads(self, list_id: &str, lead_ids: &[&str]) -> Self {
        self.leads.lock().unwrap().insert(
            list_id.to_string(),
            lead_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_detail(self, lead_id: &str, fields: &[(&str, &str)]) -> Self {
        self.details.lock().unwrap().insert(
            lead_id.to_string(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_recording(self, phone: &str, file_name: &str) -> Self {
        self.recordings
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_default()
            .push(file_name.to_string());
        self
    }

    /// Paths of every temporary audio file handed out so far.
    pub fn downloaded_paths(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListProbe for ScriptedSource {
    async fn probe(&self, list_id: &str) -> Result<Option<CampaignList>, SourceError> {
        if *self.unreachable.lock().unwrap() {
            return Err(SourceError::Connection("connection refused".to_string()));
        }
        match self.lists.lock().unwrap().get(list_id) {
            Some(Ok(list)) => Ok(Some(list.clone())),
            Some(Err(body)) => Err(SourceError::Status {
                status: 500,
                body: body.clone(),
            }),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LeadSearch for ScriptedSource {
    async fn search(&self, list: &CampaignList, _status: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .leads
            .lock()
            .unwrap()
            .get(&list.id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl LeadDetailFetch for ScriptedSource {
    async fn fetch(&self, lead_id: &str) -> Result<Option<HashMap<String, String>>, SourceError> {
        Ok(self.details.lock().unwrap().get(lead_id).cloned())
    }
}

#[async_trait]
impl RecordingSource for ScriptedSource {
    async fn find(&self, phone: &str) -> Result<Option<Recording>, SourceError> {
        let recordings = self.recordings.lock().unwrap();
        let Some(files) = recordings.get(phone) else {
            return Ok(None);
        };
        Ok(files.iter().max().map(|file_name| Recording {
            file_name: file_name.clone(),
            url: format!("http://recordings.test/{file_name}"),
            candidates: files.len(),
        }))
    }

    async fn download(&self, recording: &Recording) -> Result<TempPath, SourceError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(recording.file_name.as_bytes())?;
        let path = file.into_temp_path();
        self.downloads.lock().unwrap().push(path.to_path_buf());
        Ok(path)
    }
}

// --- Mock Workers ---

/// What a scripted worker does for a given key.
#[derive(Clone, Debug)]
pub enum WorkerScript {
    Succeed(String),
    Fail(String),
    /// Behaves like a worker that was killed at its deadline.
    TimeOut,
    /// Cancels the run while the worker is busy.
    Interrupt,
}

/// A transcriber scripted by the contents of the audio file (the recording name,
/// as written by `ScriptedSource::download`).
#[derive(Clone, Default)]
pub struct ScriptedTranscriber {
    scripts: Arc<Mutex<HashMap<String, WorkerScript>>>,
    seen_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, recording_file: &str, script: WorkerScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(recording_file.to_string(), script);
        self
    }

    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, WorkerError> {
        self.seen_paths.lock().unwrap().push(audio.to_path_buf());
        let key = tokio::fs::read_to_string(audio).await?;
        let script = self.scripts.lock().unwrap().get(&key).cloned();
        match script {
            Some(WorkerScript::Succeed(text)) => Ok(text),
            Some(WorkerScript::Fail(reason)) => Err(WorkerError::Rejected(reason)),
            Some(WorkerScript::TimeOut) => Err(WorkerError::Timeout {
                after: Duration::from_secs(300),
            }),
            Some(WorkerScript::Interrupt) => {
                cancel.cancel();
                Err(WorkerError::Cancelled)
            }
            None => Err(WorkerError::Rejected("no script".to_string())),
        }
    }
}

/// An extractor scripted per lead id. `Succeed` carries a JSON object.
#[derive(Clone, Default)]
pub struct ScriptedExtractor {
    scripts: Arc<Mutex<HashMap<String, WorkerScript>>>,
    contexts: Arc<Mutex<Vec<LeadContext>>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, lead_id: &str, script: WorkerScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(lead_id.to_string(), script);
        self
    }

    pub fn contexts(&self) -> Vec<LeadContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttributeExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _transcript: &str,
        lead: &LeadContext,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, WorkerError> {
        self.contexts.lock().unwrap().push(lead.clone());
        let script = self.scripts.lock().unwrap().get(&lead.lead_id).cloned();
        match script {
            Some(WorkerScript::Succeed(json)) => {
                let value: Value = serde_json::from_str(&json)
                    .map_err(|e| WorkerError::MalformedOutput(e.to_string()))?;
                match value {
                    Value::Object(map) => Ok(map.into_iter().collect()),
                    other => Err(WorkerError::MalformedOutput(other.to_string())),
                }
            }
            Some(WorkerScript::Fail(reason)) => Err(WorkerError::Rejected(reason)),
            Some(WorkerScript::TimeOut) => Err(WorkerError::Timeout {
                after: Duration::from_secs(120),
            }),
            Some(WorkerScript::Interrupt) => {
                cancel.cancel();
                Err(WorkerError::Cancelled)
            }
            None => Ok(BTreeMap::new()),
        }
    }
}
