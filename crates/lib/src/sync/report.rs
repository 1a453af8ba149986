use serde::Serialize;

/// Progress delivered after each list is processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub status: String,
    pub percentage: u8,
}

impl SyncProgress {
    pub fn new(current: usize, total: usize, status: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current.min(total) * 100) / total) as u8
        };
        Self {
            current,
            total,
            status: status.into(),
            percentage,
        }
    }
}

pub type ProgressCallback = dyn Fn(&SyncProgress) + Send + Sync;

/// Aggregate counts for one run. Per-lead failures only show up in the logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub lists_found: usize,
    pub lists_active: usize,
    pub leads_found: usize,
    /// Leads whose latest record was persisted.
    pub leads_processed: usize,
    /// Leads without a reachable detail view.
    pub leads_skipped: usize,
    pub save_failures: usize,
    pub transcripts_completed: usize,
    pub transcripts_failed: usize,
    /// Leads whose transcript was already settled by an earlier run.
    pub transcripts_skipped: usize,
    pub extractions_completed: usize,
    pub extractions_failed: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        format!(
            "{} of {} leads processed",
            self.leads_processed, self.leads_found
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_bounded() {
        assert_eq!(SyncProgress::new(1, 4, "x").percentage, 25);
        assert_eq!(SyncProgress::new(0, 0, "x").percentage, 100);
        assert_eq!(SyncProgress::new(5, 4, "x").percentage, 100);
    }
}
