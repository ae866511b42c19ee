use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use commands::access::{AuthorizeArgs, MatrixArgs};
use commands::database::CountArgs;
use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "hackreg",
    author,
    version,
    about = "Operator tools for the hackathon registration backend",
    long_about = "Inspect the access matrix, check single authorization decisions, and \
                  run quick queries against the configured database."
)]
struct Cli {
    /// Debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.hackreg/config.toml)
    #[arg(long, global = true, env = "HACKREG_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print which roles may perform which operation on each entity
    Matrix(MatrixArgs),
    /// Decide a single request against the access rules
    Authorize(AuthorizeArgs),
    /// Run a trivial query through the engine
    Ping,
    /// Count rows of an entity
    Count(CountArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Matrix(args) => commands::run_matrix(args)?,
        Commands::Authorize(args) => commands::run_authorize(args)?,
        Commands::Ping => commands::run_ping(cli.config.as_deref()).await?,
        Commands::Count(args) => commands::run_count(cli.config.as_deref(), args).await?,
    }
    Ok(())
}
