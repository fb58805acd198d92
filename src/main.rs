use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};

use tqm::core::cli::{Cli, Command};
use tqm::core::config::Config;
use tqm::core::state::AppState;
use tqm::core::tracing_init::init_tracing;
use tqm::handlers;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();
    let log_path = cli.log_path();

    init_tracing(cli.verbose, &log_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        log = %log_path.display(),
        dry_run = cli.dry_run,
        "Using"
    );

    // every pass runs sequentially against a single client
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    if let Err(err) = runtime.block_on(async_main(cli, &config_path)) {
        error!(error = %format!("{:#}", err), "Fatal error");
        return Err(err);
    }

    Ok(())
}

async fn async_main(cli: Cli, config_path: &Path) -> Result<()> {
    if cli.command == Command::Update {
        handlers::update::run();
        return Ok(());
    }

    if !config_path.exists() {
        Config::write_default(config_path)?;
        info!(
            config = %config_path.display(),
            "Default configuration written, adjust it and run again"
        );
        return Ok(());
    }

    let config = Config::from_file(config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;
    let state = AppState::new(config, cli.dry_run);

    match &cli.command {
        Command::Manage {
            client,
            label,
            retag,
        } => handlers::manage::run(&state, client, *label, *retag).await,
        Command::Label { client } => handlers::label::run(&state, client).await,
        Command::Retag { client, filter } => {
            handlers::retag::run(&state, client, filter.as_deref()).await
        }
        Command::Orphan { client } => handlers::orphan::run(&state, client).await,
        Command::Update => Ok(()),
    }
}
