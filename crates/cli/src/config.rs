//! # Application Configuration
//!
//! Loads the `leadsync` configuration in layers: built-in defaults, then an
//! optional YAML file (with `${VAR}` substitution), then `LEADSYNC_` prefixed
//! environment variables with `__` separating nested keys, e.g.
//! `LEADSYNC_VICIDIAL__BASE_URL`.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use leadsync::{SyncOptions, WorkerSpec, DEFAULT_SOURCE_TAG};
use leadsync_vicidial::VicidialConfig;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "leadsync.yml";

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}").unwrap());

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    General(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `leadsync.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Path of the SQLite lead database, or ":memory:".
    #[serde(default = "default_db_url")]
    pub db_url: String,
    #[serde(default)]
    pub vicidial: VicidialConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

fn default_db_url() -> String {
    "db/leadsync.db".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub status_filter: String,
    pub source_tag: String,
    /// Explicit list ids to probe. Empty means enumerate or use the id range.
    pub candidate_lists: Vec<String>,
    pub list_id_start: u32,
    pub list_id_end: u32,
    pub enumerate_lists: bool,
    pub retry_failed_transcripts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_filter: "SALE".to_string(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            candidate_lists: Vec::new(),
            list_id_start: 1001,
            list_id_end: 1010,
            enumerate_lists: false,
            retry_failed_transcripts: false,
        }
    }
}

/// How to launch one external worker.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl WorkerConfig {
    pub fn spec(&self) -> WorkerSpec {
        WorkerSpec::new(
            self.program.clone(),
            self.args.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_transcribe_worker")]
    pub transcribe: WorkerConfig,
    #[serde(default = "default_extract_worker")]
    pub extract: WorkerConfig,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            transcribe: default_transcribe_worker(),
            extract: default_extract_worker(),
        }
    }
}

fn default_transcribe_worker() -> WorkerConfig {
    WorkerConfig {
        program: "python3".to_string(),
        args: vec!["scripts/transcribe.py".to_string()],
        timeout_secs: 300,
    }
}

fn default_extract_worker() -> WorkerConfig {
    WorkerConfig {
        program: "python3".to_string(),
        args: vec!["scripts/extract_lead_info.py".to_string()],
        timeout_secs: 120,
    }
}

impl AppConfig {
    /// Checks the settings every command relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let workers = &self.workers;
        for (name, worker) in [("transcribe", &workers.transcribe), ("extract", &workers.extract)] {
            if worker.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "workers.{name}.program is empty"
                )));
            }
            if worker.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "workers.{name}.timeout_secs must be positive"
                )));
            }
        }
        if workers.extract.timeout_secs >= workers.transcribe.timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "workers.extract.timeout_secs ({}) must be below workers.transcribe.timeout_secs ({})",
                workers.extract.timeout_secs, workers.transcribe.timeout_secs
            )));
        }
        if self.sync.list_id_start > self.sync.list_id_end {
            return Err(ConfigError::Invalid(format!(
                "sync.list_id_start ({}) is after sync.list_id_end ({})",
                self.sync.list_id_start, self.sync.list_id_end
            )));
        }
        Ok(())
    }

    /// Checks the settings needed to talk to ViciDial.
    pub fn require_source(&self) -> Result<(), ConfigError> {
        if self.vicidial.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "vicidial.base_url is not set (LEADSYNC_VICIDIAL__BASE_URL)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        let sync = &self.sync;
        SyncOptions {
            status_filter: sync.status_filter.clone(),
            list_ids: (!sync.candidate_lists.is_empty()).then(|| sync.candidate_lists.clone()),
            enumerate_lists: sync.enumerate_lists,
            default_list_range: sync.list_id_start..=sync.list_id_end,
            source_tag: sync.source_tag.clone(),
            retry_failed_transcripts: sync.retry_failed_transcripts,
            ..SyncOptions::default()
        }
    }
}

// Reads a file and substitutes `${VAR}` with the environment value (empty when unset).
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| {
        ConfigError::General(format!(
            "Failed to read config file '{}': {e}",
            path.display()
        ))
    })?;
    let expanded = ENV_VAR_RE.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });
    Ok(Some(expanded.into_owned()))
}

/// Loads and validates the configuration.
///
/// An explicit `config_path` must exist; otherwise `leadsync.yml` in the working
/// directory is used when present.
pub fn get_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let transcribe = default_transcribe_worker();
    let extract = default_extract_worker();
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults. Worker keys are set one by one so a
        // partial override (e.g. only `timeout_secs`) still deserializes.
        .set_default("db_url", default_db_url())?
        .set_default("workers.transcribe.program", transcribe.program)?
        .set_default("workers.transcribe.args", transcribe.args)?
        .set_default("workers.transcribe.timeout_secs", transcribe.timeout_secs)?
        .set_default("workers.extract.program", extract.program)?
        .set_default("workers.extract.args", extract.args)?
        .set_default("workers.extract.timeout_secs", extract.timeout_secs)?;

    // Layer 2: YAML file.
    let file_content = match config_path {
        Some(path) => Some(read_and_substitute(path)?.ok_or_else(|| {
            ConfigError::NotFound(format!("Config file not found at '{}'", path.display()))
        })?),
        None => read_and_substitute(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    if let Some(content) = file_content {
        info!(
            path = %config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE)).display(),
            "loading configuration file"
        );
        builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
    }

    // Layer 3: Prefixed environment variables. Values are kept as text and
    // only numeric or boolean fields are converted on deserialization.
    let settings = builder
        .add_source(
            Environment::with_prefix("LEADSYNC")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sync.candidate_lists")
                .with_list_parse_key("workers.transcribe.args")
                .with_list_parse_key("workers.extract.args"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
