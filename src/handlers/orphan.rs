use anyhow::{Context, Result};
use tracing::debug;

use crate::core::error::ConfigError;
use crate::core::startup::load_session;
use crate::core::state::AppState;
use crate::manager::remove_orphans;
use crate::stores::TorrentFileMap;

/// Remove local files and folders under the client's download path that no torrent owns
pub async fn run(state: &AppState, client: &str) -> Result<()> {
    let client_config = state.config.client(client)?;
    let download_path = client_config
        .download_path
        .as_deref()
        .ok_or_else(|| ConfigError::MissingDownloadPath(client.to_string()))?;

    let mapping = &client_config.download_path_mapping;
    if !mapping.is_empty() {
        debug!(count = mapping.len(), mapping = ?mapping, "Loaded client download path mappings");
    }

    let session = load_session(client, client_config, None)
        .await
        .context("Failed loading client torrents")?;
    let file_map = TorrentFileMap::new(&session.torrents);
    debug!(files = file_map.len(), "Mapped torrents to unique torrent files");

    remove_orphans(download_path, &file_map, mapping, state.dry_run);

    Ok(())
}
