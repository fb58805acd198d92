use anyhow::Result;

use super::{manager_options, open_session, prepare};
use crate::core::state::AppState;
use crate::manager::Manager;

/// Relabel torrents matching the client's label rules
pub async fn run(state: &AppState, client: &str) -> Result<()> {
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
    manager.relabel_pass().await;

    Ok(())
}
