//! Entry points for each CLI command.

pub mod label;
pub mod manage;
pub mod orphan;
pub mod retag;
pub mod update;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::config::ClientConfig;
use crate::core::startup::{load_session, Session};
use crate::core::state::AppState;
use crate::expression::Expressions;
use crate::manager::ManagerOptions;
use crate::trackers::Trackers;

/// Resolve a client and compile its filter, or `filter` when given instead
pub(crate) fn prepare<'a>(
    state: &'a AppState,
    client: &str,
    filter: Option<&str>,
) -> Result<(&'a ClientConfig, Expressions)> {
    let client_config = state.config.client(client)?;
    let filter_name = filter.unwrap_or(&client_config.filter);
    let filter = state
        .config
        .filter(filter_name)
        .context("Failed retrieving client filter")?;

    let expressions = Expressions::compile(filter).context("Failed compiling client filters")?;
    debug!(filter = filter_name, "Compiled client filters");

    Ok((client_config, expressions))
}

/// Connect to the client, consulting tracker APIs only when a rule needs them
pub(crate) async fn open_session(
    state: &AppState,
    client: &str,
    client_config: &ClientConfig,
    expressions: &Expressions,
) -> Result<Session> {
    let trackers = if expressions.uses_unregistered() {
        let trackers = Trackers::from_config(&state.config.trackers)
            .context("Failed initializing tracker apis")?;
        info!(loaded = trackers.len(), "Loaded tracker apis");
        Some(trackers)
    } else {
        None
    };

    load_session(client, client_config, trackers.as_ref()).await
}

pub(crate) fn manager_options(state: &AppState, client_config: &ClientConfig) -> ManagerOptions {
    ManagerOptions {
        dry_run: state.dry_run,
        retention_limit: state.config.retention_limit(client_config),
        ..Default::default()
    }
}
