use crate::parse::{
    file_name, parse_lead_form, parse_lead_ids, parse_list_ids, parse_list_info,
    parse_recording_links,
};
use crate::{VicidialError, VicidialSession};
use async_trait::async_trait;
use leadsync::normalize::normalize_phone;
use leadsync::{
    CampaignList, LeadDetailFetch, LeadSearch, ListProbe, Recording, RecordingSource, SourceError,
};
use std::collections::HashMap;
use tempfile::TempPath;
use tracing::{debug, info, warn};

const NON_AGENT_API_PATH: &str = "vicidial/non_agent_api.php";
const ADMIN_PATH: &str = "vicidial/admin.php";
const SEARCH_PATH: &str = "vicidial/admin_search_lead.php";
const MODIFY_LEAD_PATH: &str = "vicidial/admin_modify_lead.php";

#[async_trait]
impl ListProbe for VicidialSession {
    async fn probe(&self, list_id: &str) -> Result<Option<CampaignList>, SourceError> {
        let config = self.config();
        let query = [
            ("function", "list_info"),
            ("list_id", list_id),
            ("user", config.user.as_str()),
            ("pass", config.pass.as_str()),
            ("source", config.api_source.as_str()),
            ("stage", "pipe"),
            ("header", "NO"),
        ];
        match self.get_text(NON_AGENT_API_PATH, &query).await {
            Ok(body) => Ok(parse_list_info(list_id, &body)?),
            Err(VicidialError::Status { status, .. }) => {
                debug!(%list_id, status, "list_info answered with an error status");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn enumerate(&self) -> Result<Vec<String>, SourceError> {
        let html = self.get_text(ADMIN_PATH, &[("ADD", "100")]).await?;
        let ids = parse_list_ids(&html);
        debug!(count = ids.len(), "list ids found on the lists page");
        Ok(ids)
    }
}

#[async_trait]
impl LeadSearch for VicidialSession {
    /// Tries the per-list form search first, then the generic status search.
    async fn search(&self, list: &CampaignList, status: &str) -> Result<Vec<String>, SourceError> {
        let mut last_error = None;

        let form = [
            ("list_id", list.id.as_str()),
            ("status", status),
            ("submit", "SUBMIT"),
        ];
        match self.post_form(SEARCH_PATH, &form).await {
            Ok(html) => {
                let ids = parse_lead_ids(&html);
                if !ids.is_empty() {
                    info!(list_id = %list.id, count = ids.len(), "leads found by list search");
                    return Ok(ids);
                }
                debug!(list_id = %list.id, "list search returned no leads");
            }
            Err(e) => {
                warn!(list_id = %list.id, "list search failed: {e}");
                last_error = Some(e);
            }
        }

        match self.get_text(SEARCH_PATH, &[("status", status)]).await {
            Ok(html) => {
                let ids = parse_lead_ids(&html);
                if !ids.is_empty() {
                    info!(list_id = %list.id, count = ids.len(), "leads found by status search");
                    return Ok(ids);
                }
                debug!(list_id = %list.id, "status search returned no leads");
                last_error = None;
            }
            Err(e) => {
                warn!(list_id = %list.id, "status search failed: {e}");
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => {
                warn!(list_id = %list.id, %status, "no leads found by any search strategy");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl LeadDetailFetch for VicidialSession {
    async fn fetch(&self, lead_id: &str) -> Result<Option<HashMap<String, String>>, SourceError> {
        let html = match self
            .get_text(MODIFY_LEAD_PATH, &[("lead_id", lead_id)])
            .await
        {
            Ok(html) => html,
            Err(VicidialError::Status { status, .. }) => {
                info!(%lead_id, status, "lead detail page is not available");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let fields = parse_lead_form(&html);
        match &fields {
            Some(fields) => debug!(%lead_id, count = fields.len(), "lead form parsed"),
            None => info!(%lead_id, "lead detail page has no lead form"),
        }
        Ok(fields)
    }
}

#[async_trait]
impl RecordingSource for VicidialSession {
    /// Picks the lexically greatest matching file name. Recording names start
    /// with `YYYYMMDD-HHMMSS`, so that is the most recent call.
    async fn find(&self, phone: &str) -> Result<Option<Recording>, SourceError> {
        let phone = normalize_phone(phone);
        if phone.is_empty() {
            return Ok(None);
        }

        let listing_url = self.recordings_url();
        let html = self
            .get_text(&self.config().recordings_path, &[])
            .await?;
        let links = parse_recording_links(&html, &phone);
        let candidates = links.len();
        let Some(href) = links.into_iter().max_by(|a, b| file_name(a).cmp(file_name(b))) else {
            debug!(%phone, "no recording matches this phone");
            return Ok(None);
        };

        let url = if href.starts_with("http://") || href.starts_with("https://") {
            href.clone()
        } else if href.starts_with('/') {
            self.url(&href)
        } else {
            format!("{listing_url}{href}")
        };
        Ok(Some(Recording {
            file_name: file_name(&href).to_string(),
            url,
            candidates,
        }))
    }

    async fn download(&self, recording: &Recording) -> Result<TempPath, SourceError> {
        Ok(self
            .download_to_temp(&recording.url, &recording.file_name)
            .await?)
    }
}
