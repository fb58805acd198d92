use anyhow::{bail, Context, Result};

use super::{manager_options, open_session, prepare};
use crate::core::state::AppState;
use crate::manager::Manager;

/// Retag torrents using the client's filter, or `filter` when given
pub async fn run(state: &AppState, client: &str, filter: Option<&str>) -> Result<()> {
    let (client_config, expressions) = prepare(state, client, filter)?;
    let session = open_session(state, client, client_config, &expressions).await?;

    if session.client.as_tag_client().is_none() {
        bail!(
            "Retagging is not supported by {} client {:?}",
            session.client.kind(),
            client
        );
    }

    let mut manager = Manager::new(
        session.client.as_ref(),
        &expressions,
        session.torrents,
        session.free_space,
        manager_options(state, client_config),
    );

    manager.ignore_pass();
    manager
        .retag_pass()
        .await
        .context("Failed to create tags on client")?;

    Ok(())
}
