use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn, Level};

use crate::clients::{new_client, TorrentClient};
use crate::core::config::ClientConfig;
use crate::models::Snapshot;
use crate::trackers::Trackers;
use crate::utils::bytes::{gib, ibytes};

/// A connected client together with what it reported at startup
pub struct Session {
    pub client: Box<dyn TorrentClient>,
    pub torrents: Snapshot,
    pub free_space: Option<i64>,
}

/// Connect to a client, read its free space and torrents, and let the
/// tracker APIs flag unregistered torrents when `trackers` is given
pub async fn load_session(
    name: &str,
    config: &ClientConfig,
    trackers: Option<&Trackers>,
) -> Result<Session> {
    let mut client = new_client(name, &config.connection)
        .context(format!("Failed initializing client: {:?}", name))?;
    info!(
        client = name,
        kind = client.kind(),
        trackers = trackers.map_or(0, Trackers::len),
        "Initialized client"
    );

    client.connect().await.context("Failed connecting")?;
    debug!(client = name, "Connected to client");

    let free_space = match config.free_space_path.as_deref() {
        Some(path) => match client.free_space(path).await {
            Ok(space) => {
                info!(
                    path,
                    free_space = %ibytes(space),
                    free_space_gb = %format!("{:.2}", gib(space)),
                    "Retrieved free-space"
                );
                Some(space)
            }
            Err(err) => {
                warn!(path, error = %err, "Failed retrieving free-space");
                None
            }
        },
        None => None,
    };

    let mut torrents = client.torrents().await.context("Failed retrieving torrents")?;
    info!(count = torrents.len(), "Retrieved torrents");

    if tracing::enabled!(Level::TRACE) {
        match serde_json::to_string(&torrents) {
            Ok(json) => trace!(torrents = %json, "Retrieved torrent details"),
            Err(err) => warn!(error = %err, "Failed marshalling torrents"),
        }
    }

    if let Some(trackers) = trackers {
        trackers.annotate(&mut torrents).await;
    }

    Ok(Session {
        client,
        torrents,
        free_space,
    })
}
