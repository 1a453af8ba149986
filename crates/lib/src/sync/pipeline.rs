use super::discovery::{discover_lists, resolve_candidates, search_leads};
use super::guard::SyncCoordinator;
use super::report::{ProgressCallback, SyncProgress, SyncReport};
use crate::errors::SyncError;
use crate::normalize::{lead_from_fields, owning_list};
use crate::providers::db::storage::LeadStore;
use crate::providers::worker::{AttributeExtractor, LeadContext, Transcriber, WorkerError};
use crate::sources::{LeadDetailFetch, LeadSearch, ListProbe, RecordingSource};
use crate::types::{CampaignList, LeadRecord, TranscriptStatus, DEFAULT_SOURCE_TAG};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Single-flight scope; two runs with the same scope never overlap.
    pub scope: String,
    pub status_filter: String,
    /// Explicit list ids to probe. Overrides enumeration and the default range.
    pub list_ids: Option<Vec<String>>,
    pub enumerate_lists: bool,
    pub default_list_range: RangeInclusive<u32>,
    pub source_tag: String,
    /// Give leads whose transcript failed on an earlier run another attempt.
    pub retry_failed_transcripts: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            scope: "vicidial".to_string(),
            status_filter: "SALE".to_string(),
            list_ids: None,
            enumerate_lists: false,
            default_list_range: 1001..=1010,
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            retry_failed_transcripts: false,
        }
    }
}

/// Sequential lead-sync orchestrator.
///
/// Leads are handled one at a time, in list-then-discovery order. Every stage
/// failure is contained to its lead; only an unreachable source, a cancellation
/// or an overlapping run end a sync early.
pub struct LeadSyncPipeline {
    list_probe: Arc<dyn ListProbe>,
    lead_search: Arc<dyn LeadSearch>,
    lead_detail: Arc<dyn LeadDetailFetch>,
    recordings: Arc<dyn RecordingSource>,
    transcriber: Arc<dyn Transcriber>,
    extractor: Option<Arc<dyn AttributeExtractor>>,
    store: Arc<dyn LeadStore>,
    coordinator: SyncCoordinator,
}

/// A builder for [`LeadSyncPipeline`].
#[derive(Default)]
pub struct LeadSyncPipelineBuilder {
    list_probe: Option<Arc<dyn ListProbe>>,
    lead_search: Option<Arc<dyn LeadSearch>>,
    lead_detail: Option<Arc<dyn LeadDetailFetch>>,
    recordings: Option<Arc<dyn RecordingSource>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    extractor: Option<Arc<dyn AttributeExtractor>>,
    store: Option<Arc<dyn LeadStore>>,
    coordinator: Option<SyncCoordinator>,
}

impl LeadSyncPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses one value for all four source seams.
    pub fn source<S>(self, source: Arc<S>) -> Self
    where
        S: ListProbe + LeadSearch + LeadDetailFetch + RecordingSource + 'static,
    {
        self.list_probe(source.clone())
            .lead_search(source.clone())
            .lead_detail(source.clone())
            .recordings(source)
    }

    pub fn list_probe(mut self, probe: Arc<dyn ListProbe>) -> Self {
        self.list_probe = Some(probe);
        self
    }

    pub fn lead_search(mut self, search: Arc<dyn LeadSearch>) -> Self {
        self.lead_search = Some(search);
        self
    }

    pub fn lead_detail(mut self, detail: Arc<dyn LeadDetailFetch>) -> Self {
        self.lead_detail = Some(detail);
        self
    }

    pub fn recordings(mut self, recordings: Arc<dyn RecordingSource>) -> Self {
        self.recordings = Some(recordings);
        self
    }

    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Optional; without one, transcripts are stored but not mined for attributes.
    pub fn extractor(mut self, extractor: Arc<dyn AttributeExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shares a coordinator between pipelines so they guard the same scopes.
    pub fn coordinator(mut self, coordinator: SyncCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn build(self) -> Result<LeadSyncPipeline, SyncError> {
        fn required<T>(value: Option<T>, name: &'static str) -> Result<T, SyncError> {
            value.ok_or(SyncError::MissingComponent(name))
        }
        Ok(LeadSyncPipeline {
            list_probe: required(self.list_probe, "list probe")?,
            lead_search: required(self.lead_search, "lead search")?,
            lead_detail: required(self.lead_detail, "lead detail fetch")?,
            recordings: required(self.recordings, "recording source")?,
            transcriber: required(self.transcriber, "transcriber")?,
            extractor: self.extractor,
            store: required(self.store, "lead store")?,
            coordinator: self.coordinator.unwrap_or_default(),
        })
    }
}

impl LeadSyncPipeline {
    pub fn builder() -> LeadSyncPipelineBuilder {
        LeadSyncPipelineBuilder::new()
    }

    /// Runs list discovery only.
    pub async fn discover(&self, options: &SyncOptions) -> Result<Vec<CampaignList>, SyncError> {
        let candidates = resolve_candidates(
            self.list_probe.as_ref(),
            options.list_ids.as_deref(),
            options.enumerate_lists,
            options.default_list_range.clone(),
        )
        .await;
        discover_lists(self.list_probe.as_ref(), &candidates).await
    }

    /// Runs one full sync pass.
    pub async fn run(
        &self,
        options: &SyncOptions,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let _permit = self
            .coordinator
            .try_begin(&options.scope)
            .ok_or_else(|| SyncError::AlreadyRunning(options.scope.clone()))?;
        let started = Instant::now();
        info!(scope = %options.scope, status = %options.status_filter, "starting lead sync");

        let mut report = SyncReport::default();
        let lists = self.discover(options).await?;
        let active: Vec<&CampaignList> = lists.iter().filter(|l| l.active).collect();
        report.lists_found = lists.len();
        report.lists_active = active.len();

        let mut seen = HashSet::new();
        for (index, list) in active.iter().enumerate() {
            let lead_ids = search_leads(self.lead_search.as_ref(), list, &options.status_filter).await;
            for lead_id in lead_ids {
                if !seen.insert(lead_id.clone()) {
                    debug!(%lead_id, list_id = %list.id, "lead already handled in this run");
                    continue;
                }
                if cancel.is_cancelled() {
                    warn!("sync cancelled");
                    return Err(SyncError::Cancelled);
                }
                report.leads_found += 1;
                self.process_lead(list, &lists, &lead_id, options, &mut report, cancel)
                    .await?;
            }

            if let Some(callback) = progress {
                callback(&SyncProgress::new(
                    index + 1,
                    active.len(),
                    format!("Processed list {} ({})", list.id, list.name),
                ));
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            lists = report.lists_active,
            leads = report.leads_found,
            transcripts_completed = report.transcripts_completed,
            transcripts_failed = report.transcripts_failed,
            "lead sync finished: {}",
            report.summary()
        );
        Ok(report)
    }

    /// Saves the full accumulated record. A failed write is logged and counted,
    /// never propagated.
    async fn persist(&self, lead: &LeadRecord, report: &mut SyncReport) -> bool {
        match self.store.save(lead).await {
            Ok(outcome) => {
                debug!(lead_id = %lead.lead_id, ?outcome, status = %lead.transcript_status(), "lead saved");
                true
            }
            Err(e) => {
                error!(lead_id = %lead.lead_id, "failed to save lead: {e}");
                report.save_failures += 1;
                false
            }
        }
    }

    async fn process_lead(
        &self,
        list: &CampaignList,
        known_lists: &[CampaignList],
        lead_id: &str,
        options: &SyncOptions,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let fields = match self.lead_detail.fetch(lead_id).await {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                info!(%lead_id, "lead has no detail view, skipping");
                report.leads_skipped += 1;
                return Ok(());
            }
            Err(e) => {
                warn!(%lead_id, "failed to fetch lead detail, skipping: {e}");
                report.leads_skipped += 1;
                return Ok(());
            }
        };

        let owner = owning_list(&fields, list, known_lists);
        if owner.id != list.id {
            debug!(%lead_id, searched = %list.id, owner = %owner.id, "lead belongs to another list");
        }
        let mut lead = lead_from_fields(
            lead_id,
            &fields,
            &owner,
            &options.status_filter,
            &options.source_tag,
        );
        match self.store.get(&lead.id).await {
            Ok(Some(previous)) => lead.carry_forward(&previous),
            Ok(None) => {}
            Err(e) => warn!(%lead_id, "could not load the stored copy of this lead: {e}"),
        }
        let mut saved = self.persist(&lead, report).await;

        let transcribe = match lead.transcript_status() {
            TranscriptStatus::Pending => true,
            TranscriptStatus::Failed => options.retry_failed_transcripts,
            TranscriptStatus::Processing | TranscriptStatus::Completed => false,
        };
        let mut fresh_transcript = false;
        if transcribe {
            if let Err(e) = lead.advance_transcript(TranscriptStatus::Processing) {
                warn!(%lead_id, "cannot start transcription: {e}");
            } else {
                self.persist(&lead, report).await;
                fresh_transcript = self.transcribe_lead(&mut lead, report, cancel).await;
                saved = self.persist(&lead, report).await;
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
            }
        } else {
            debug!(%lead_id, status = %lead.transcript_status(), "transcript already settled");
            report.transcripts_skipped += 1;
        }

        let needs_extraction = lead.transcript_status() == TranscriptStatus::Completed
            && (fresh_transcript || lead.extracted.is_empty());
        if needs_extraction && self.extract_attributes(&mut lead, report, cancel).await {
            saved = self.persist(&lead, report).await;
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if saved {
            report.leads_processed += 1;
        }
        Ok(())
    }

    /// Drives a `Processing` lead to `Completed` or `Failed`. Returns true on success.
    /// A cancelled run leaves the lead `Processing` for the next run to settle.
    async fn transcribe_lead(
        &self,
        lead: &mut LeadRecord,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> bool {
        let outcome = self.fetch_transcript(lead, cancel).await;
        let result = match outcome {
            Err(_) if cancel.is_cancelled() => {
                warn!(lead_id = %lead.lead_id, "transcription interrupted; lead stays processing");
                return false;
            }
            Ok(text) => lead.complete_transcript(text).map(|_| true),
            Err(note) => {
                warn!(lead_id = %lead.lead_id, "transcription failed: {note}");
                lead.fail_transcript(note).map(|_| false)
            }
        };
        match result {
            Ok(true) => {
                report.transcripts_completed += 1;
                true
            }
            Ok(false) => {
                report.transcripts_failed += 1;
                false
            }
            Err(e) => {
                error!(lead_id = %lead.lead_id, "transcript state error: {e}");
                report.transcripts_failed += 1;
                false
            }
        }
    }

    /// Finds, downloads and transcribes the lead's recording. The error is the
    /// note stored on the lead.
    async fn fetch_transcript(
        &self,
        lead: &mut LeadRecord,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        if lead.phone.is_empty() {
            return Err("No phone number on lead; cannot match a recording".to_string());
        }

        let recording = match self.recordings.find(&lead.phone).await {
            Ok(Some(recording)) => recording,
            Ok(None) => return Err(format!("No recording found for phone {}", lead.phone)),
            Err(e) => {
                return Err(format!(
                    "Recording lookup failed for phone {}: {e}",
                    lead.phone
                ))
            }
        };
        if recording.candidates > 1 {
            warn!(
                lead_id = %lead.lead_id,
                candidates = recording.candidates,
                chosen = %recording.file_name,
                "several recordings match this phone; using the most recent"
            );
        }
        lead.recording_file = Some(recording.file_name.clone());

        let audio = self
            .recordings
            .download(&recording)
            .await
            .map_err(|e| format!("Failed to download recording {}: {e}", recording.file_name))?;
        let result = self.transcriber.transcribe(&audio, cancel).await;
        if let Err(e) = audio.close() {
            warn!(lead_id = %lead.lead_id, "failed to remove temporary audio file: {e}");
        }

        result.map_err(|e| match e {
            WorkerError::Timeout { after } => format!("Transcription timed out after {after:?}"),
            other => format!("Transcription failed: {other}"),
        })
    }

    /// Merges structured attributes into a lead with a completed transcript.
    /// Returns true when the lead changed.
    async fn extract_attributes(
        &self,
        lead: &mut LeadRecord,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(extractor) = &self.extractor else {
            return false;
        };
        let Some(transcript) = lead.transcript_text.clone() else {
            return false;
        };

        let context = LeadContext::from(&*lead);
        match extractor.extract(&transcript, &context, cancel).await {
            Ok(attributes) => {
                info!(lead_id = %lead.lead_id, count = attributes.len(), "merged extracted attributes");
                lead.merge_extracted(attributes);
                report.extractions_completed += 1;
                true
            }
            Err(e) => {
                warn!(lead_id = %lead.lead_id, "structured extraction failed, keeping transcript only: {e}");
                report.extractions_failed += 1;
                false
            }
        }
    }
}
