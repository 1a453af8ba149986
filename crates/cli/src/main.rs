//! # leadsync: ViciDial Lead Sync
//!
//! Thin entry point for the `leadsync` binary. All logic lives in the
//! `leadsync_cli` library crate.

use anyhow::Result;
use clap::Parser;
use leadsync_cli::{run, Cli};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env before clap reads `env = ...` arguments.
    dotenvy::dotenv().ok();

    // 2. Setup logging
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadsync=info".parse()?))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 3. Parse CLI arguments
    let cli = Cli::parse();

    // 4. Run the command
    if let Err(e) = run(cli).await {
        eprintln!("[leadsync error] {e:?}");
        std::process::exit(1);
    }

    Ok(())
}
