use crate::VicidialError;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Connection settings for one ViciDial server.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct VicidialConfig {
    /// Server root, e.g. `https://dialer.example.com`. Admin pages live under `/vicidial/`.
    pub base_url: String,
    pub user: String,
    pub pass: String,
    /// Reported to the non-agent API as `source`.
    pub api_source: String,
    pub request_timeout_secs: u64,
    /// Directory listing of call recordings, relative to `base_url`.
    pub recordings_path: String,
}

impl Default for VicidialConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user: String::new(),
            pass: String::new(),
            api_source: "leadsync".to_string(),
            request_timeout_secs: 30,
            recordings_path: "RECORDINGS/MP3/".to_string(),
        }
    }
}

impl fmt::Debug for VicidialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VicidialConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("api_source", &self.api_source)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("recordings_path", &self.recordings_path)
            .finish()
    }
}

/// An authenticated HTTP session against one ViciDial server.
///
/// Created once per process with [`VicidialSession::create`] and shared by `Arc`
/// between the source seams; [`VicidialSession::dispose`] ends it.
pub struct VicidialSession {
    client: Client,
    config: VicidialConfig,
    base: String,
}

impl VicidialSession {
    pub fn create(config: VicidialConfig) -> Result<Self, VicidialError> {
        let base = config.base_url.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(VicidialError::Config("base_url is empty".to_string()));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(VicidialError::Config(format!(
                "base_url must be an http(s) URL, got '{base}'"
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(concat!("leadsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(base_url = %base, user = %config.user, "ViciDial session created");
        Ok(Self {
            client,
            config,
            base,
        })
    }

    pub fn dispose(self) {
        info!(base_url = %self.base, "ViciDial session closed");
    }

    pub fn config(&self) -> &VicidialConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub(crate) fn recordings_url(&self) -> String {
        let path = self.config.recordings_path.trim_matches('/');
        format!("{}/{}/", self.base, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.config.user, Some(&self.config.pass))
    }

    async fn checked(response: Response) -> Result<Response, VicidialError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VicidialError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    /// GETs a page and returns its body.
    pub(crate) async fn get_text(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, VicidialError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .authed(self.client.get(&url))
            .query(query)
            .send()
            .await?;
        Ok(Self::checked(response).await?.text().await?)
    }

    /// POSTs a urlencoded form and returns the response body.
    pub(crate) async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<String, VicidialError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .authed(self.client.post(&url))
            .form(form)
            .send()
            .await?;
        Ok(Self::checked(response).await?.text().await?)
    }

    /// Streams `url` into a new temporary file. The file is removed when the
    /// returned path is dropped, including when the download fails midway.
    pub(crate) async fn download_to_temp(
        &self,
        url: &str,
        file_name: &str,
    ) -> Result<TempPath, VicidialError> {
        let suffix = Path::new(file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix("leadsync-")
            .suffix(&suffix)
            .tempfile()?;
        let (file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let response = self.authed(self.client.get(url)).send().await?;
        let mut response = Self::checked(response).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        debug!(%url, bytes = written, path = %path.display(), "recording downloaded");
        Ok(path)
    }
}
