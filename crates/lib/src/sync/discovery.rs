use crate::errors::SyncError;
use crate::sources::{LeadSearch, ListProbe, SourceError};
use crate::types::CampaignList;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

fn sort_list_ids(ids: &mut Vec<String>) {
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    ids.dedup();
}

/// Picks the list ids to probe: the caller's set, else whatever the source can
/// enumerate, else the default numeric range.
pub async fn resolve_candidates(
    probe: &dyn ListProbe,
    explicit: Option<&[String]>,
    enumerate: bool,
    default_range: RangeInclusive<u32>,
) -> Vec<String> {
    if let Some(ids) = explicit.filter(|ids| !ids.is_empty()) {
        return ids.to_vec();
    }

    if enumerate {
        match probe.enumerate().await {
            Ok(mut ids) if !ids.is_empty() => {
                sort_list_ids(&mut ids);
                info!(count = ids.len(), "enumerated candidate lists");
                return ids;
            }
            Ok(_) => debug!("list enumeration found nothing, using the default range"),
            Err(e) => warn!("list enumeration failed, using the default range: {e}"),
        }
    }

    default_range.map(|id| id.to_string()).collect()
}

/// Probes every candidate and returns the lists the remote system knows, in
/// probe order.
///
/// Lists that do not exist and application-level errors are skipped. Only when
/// every single probe failed to connect is the source considered unreachable.
pub async fn discover_lists(
    probe: &dyn ListProbe,
    candidates: &[String],
) -> Result<Vec<CampaignList>, SyncError> {
    let mut lists = Vec::new();
    let mut connection_failures = 0usize;
    let mut last_connection_error: Option<SourceError> = None;

    for list_id in candidates {
        match probe.probe(list_id).await {
            Ok(Some(list)) => {
                debug!(list_id = %list.id, active = list.active, "found list");
                lists.push(list);
            }
            Ok(None) => debug!(%list_id, "list does not exist"),
            Err(e) if e.is_connection() => {
                warn!(%list_id, "list probe could not connect: {e}");
                connection_failures += 1;
                last_connection_error = Some(e);
            }
            Err(e) => debug!(%list_id, "list probe failed, skipping: {e}"),
        }
    }

    if !candidates.is_empty() && connection_failures == candidates.len() {
        if let Some(e) = last_connection_error {
            return Err(SyncError::SourceUnreachable(e));
        }
    }

    info!(
        probed = candidates.len(),
        found = lists.len(),
        active = lists.iter().filter(|l| l.active).count(),
        "list discovery finished"
    );
    Ok(lists)
}

/// Lead ids in `list` carrying `status`. A failed search contributes nothing.
pub async fn search_leads(search: &dyn LeadSearch, list: &CampaignList, status: &str) -> Vec<String> {
    match search.search(list, status).await {
        Ok(ids) => {
            info!(list_id = %list.id, %status, count = ids.len(), "found leads");
            ids
        }
        Err(e) => {
            warn!(list_id = %list.id, %status, "lead search failed, skipping list: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_ids_sort_numerically() {
        let mut ids = vec!["1010".to_string(), "999".into(), "1002".into(), "999".into()];
        sort_list_ids(&mut ids);
        assert_eq!(ids, vec!["999", "1002", "1010"]);
    }
}
