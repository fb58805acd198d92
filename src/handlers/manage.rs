use anyhow::{Context, Result};
use tracing::info;

use super::{manager_options, open_session, prepare};
use crate::core::state::AppState;
use crate::manager::Manager;

/// Remove eligible torrents, then optionally relabel and retag the rest
pub async fn run(state: &AppState, client: &str, label: bool, retag: bool) -> Result<()> {
    let (client_config, expressions) = prepare(state, client, None)?;
    let session = open_session(state, client, client_config, &expressions).await?;

    let mut manager = Manager::new(
        session.client.as_ref(),
        &expressions,
        session.torrents,
        session.free_space,
        manager_options(state, client_config),
    );

    manager.ignore_pass();
    manager.remove_pass().await;

    if label {
        info!("Relabeling remaining torrents");
        manager.relabel_pass().await;
    }
    if retag {
        info!("Retagging remaining torrents");
        manager
            .retag_pass()
            .await
            .context("Failed to create tags on client")?;
    }

    Ok(())
}
