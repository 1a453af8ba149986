//! # `leadsync` Library Crate
//!
//! Command handling for the `leadsync` binary: pulls sold leads out of ViciDial,
//! enriches them with call transcripts and extracted attributes, and stores them
//! in the local lead database.

pub mod config;

use crate::config::{get_config, AppConfig};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use leadsync::sync::{discover_lists, resolve_candidates};
use leadsync::{
    LeadRecord, LeadStore, LeadSyncPipeline, ProgressCallback, SqliteLeadStore, SyncOptions,
    SyncProgress, WorkerExtractor, WorkerTranscriber,
};
use leadsync_vicidial::VicidialSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// --- CLI Argument Structs ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML configuration file. Defaults to ./leadsync.yml when present.
    #[arg(long, short, global = true, env = "LEADSYNC_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one full sync: discover lists and leads, transcribe, extract, store.
    Sync(SyncArgs),
    /// Probe candidate lists and print the ones ViciDial knows.
    Lists(ListsArgs),
    /// Print every stored lead as one JSON object per line.
    Leads,
    /// Print one stored lead.
    Show(ShowArgs),
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Lead status to sync (overrides `sync.status_filter`).
    #[arg(long)]
    pub status: Option<String>,
    /// Comma separated list ids to probe instead of the configured candidates.
    #[arg(long, value_delimiter = ',')]
    pub lists: Option<Vec<String>>,
    /// Transcribe again leads whose transcript failed on an earlier run.
    #[arg(long)]
    pub retry_failed: bool,
}

#[derive(Parser, Debug)]
pub struct ListsArgs {
    /// Comma separated list ids to probe instead of the configured candidates.
    #[arg(long, value_delimiter = ',')]
    pub lists: Option<Vec<String>>,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Local record id or ViciDial lead id.
    pub id: String,
}

// --- Command Dispatch ---

pub async fn run(cli: Cli) -> Result<()> {
    let config = get_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Sync(args) => sync(&config, args).await,
        Commands::Lists(args) => lists(&config, args).await,
        Commands::Leads => leads(&config).await,
        Commands::Show(args) => show(&config, args).await,
    }
}

fn sync_options(config: &AppConfig, status: Option<String>, lists: Option<Vec<String>>) -> SyncOptions {
    let mut options = config.sync_options();
    if let Some(status) = status {
        options.status_filter = status;
    }
    if let Some(lists) = lists.filter(|l| !l.is_empty()) {
        options.list_ids = Some(lists);
    }
    options
}

async fn open_store(db_url: &str) -> Result<SqliteLeadStore> {
    if db_url != ":memory:" {
        if let Some(parent) = Path::new(db_url).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }
    }
    Ok(SqliteLeadStore::new(db_url).await?)
}

fn open_session(config: &AppConfig) -> Result<Arc<VicidialSession>> {
    config.require_source()?;
    Ok(Arc::new(VicidialSession::create(config.vicidial.clone())?))
}

fn close_session(session: Arc<VicidialSession>) {
    match Arc::try_unwrap(session) {
        Ok(session) => session.dispose(),
        Err(_) => warn!("ViciDial session is still shared; leaving it to be dropped"),
    }
}

async fn sync(config: &AppConfig, args: SyncArgs) -> Result<()> {
    let mut options = sync_options(config, args.status, args.lists);
    options.retry_failed_transcripts |= args.retry_failed;

    let store = Arc::new(open_store(&config.db_url).await?);
    let session = open_session(config)?;
    let pipeline = LeadSyncPipeline::builder()
        .source(session.clone())
        .transcriber(Arc::new(WorkerTranscriber::new(config.workers.transcribe.spec())))
        .extractor(Arc::new(WorkerExtractor::new(config.workers.extract.spec())))
        .store(store)
        .build()?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping the sync");
                cancel.cancel();
            }
        }
    });

    let progress = |p: &SyncProgress| {
        info!(
            current = p.current,
            total = p.total,
            percentage = p.percentage,
            "{}",
            p.status
        );
    };
    let result = pipeline
        .run(&options, Some(&progress as &ProgressCallback), &cancel)
        .await;
    interrupt.abort();
    drop(pipeline);
    close_session(session);

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", report.summary());
    Ok(())
}

async fn lists(config: &AppConfig, args: ListsArgs) -> Result<()> {
    let options = sync_options(config, None, args.lists);
    let session = open_session(config)?;

    let candidates = resolve_candidates(
        session.as_ref(),
        options.list_ids.as_deref(),
        options.enumerate_lists,
        options.default_list_range.clone(),
    )
    .await;
    let found = discover_lists(session.as_ref(), &candidates).await;
    close_session(session);

    println!("{}", serde_json::to_string_pretty(&found?)?);
    Ok(())
}

async fn leads(config: &AppConfig) -> Result<()> {
    let store = open_store(&config.db_url).await?;
    for lead in store.list().await? {
        println!("{}", serde_json::to_string(&lead)?);
    }
    Ok(())
}

async fn show(config: &AppConfig, args: ShowArgs) -> Result<()> {
    let store = open_store(&config.db_url).await?;
    let lead = match store.get(&args.id).await? {
        Some(lead) => Some(lead),
        None => store.get(&LeadRecord::local_id_for(&args.id)).await?,
    };
    let lead = lead.ok_or_else(|| anyhow!("no stored lead with id '{}'", args.id))?;
    println!("{}", serde_json::to_string_pretty(&lead)?);
    Ok(())
}
