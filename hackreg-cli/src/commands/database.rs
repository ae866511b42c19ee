//! Commands that go through the query engine to the configured database

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hackreg_core::{DataMapper, HackregConfig, QueryRequest, ReadOptions};
use hackreg_server::AppState;

#[derive(Parser, Debug)]
pub struct CountArgs {
    /// Entity to count (hackathon, pre-registration)
    pub entity: String,

    /// Restrict to one hackathon
    #[arg(long)]
    pub hackathon: Option<String>,
}

fn connect(config: Option<&Path>) -> Result<AppState> {
    let config = HackregConfig::load(config)?;
    AppState::from_config(&config).context("failed to set up database pool")
}

pub async fn run_ping(config: Option<&Path>) -> Result<()> {
    let state = connect(config)?;
    let started = std::time::Instant::now();
    let rows = state
        .engine()
        .execute(QueryRequest::new("SELECT 1 AS ok"))
        .await
        .context("database ping failed")?;
    tracing::debug!(?rows, "ping result");
    println!("ok ({} ms)", started.elapsed().as_millis());
    Ok(())
}

pub async fn run_count(config: Option<&Path>, args: CountArgs) -> Result<()> {
    let state = connect(config)?;
    let mut opts = ReadOptions::default();
    if let Some(hackathon) = args.hackathon {
        opts = opts.by_hackathon(hackathon);
    }

    let count = match args.entity.as_str() {
        "hackathon" => state.hackathons().get_count(&opts).await,
        "pre-registration" => state.pre_registrations().get_count(&opts).await,
        "extra-credit" => state.extra_credit().get_count(&opts).await,
        other => bail!("unknown entity '{}'", other),
    }
    .with_context(|| format!("failed to count {}", args.entity))?;

    println!("{}", count);
    Ok(())
}
