//! Torrent client capability interface and its adapters.

pub mod deluge;
pub mod qbittorrent;

use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

use crate::core::config::ConnectionConfig;
use crate::core::error::ClientError;
use crate::models::Snapshot;

pub use deluge::Deluge;
pub use qbittorrent::QBittorrent;

/// Request timeout shared by every adapter
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations every supported torrent client provides
#[async_trait]
pub trait TorrentClient: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Authenticate and verify the remote API is usable
    async fn connect(&mut self) -> Result<(), ClientError>;

    async fn torrents(&self) -> Result<Snapshot, ClientError>;

    async fn pause(&self, hash: &str) -> Result<(), ClientError>;

    async fn resume(&self, hash: &str) -> Result<(), ClientError>;

    async fn reannounce(&self, hash: &str) -> Result<(), ClientError>;

    /// Remove the torrent, returning whether the client accepted it
    async fn delete(&self, hash: &str, delete_data: bool) -> Result<bool, ClientError>;

    /// Pause, resume and reannounce the torrent so the tracker sees final stats, then delete it
    async fn remove_torrent(&self, hash: &str, delete_data: bool) -> Result<bool, ClientError> {
        trace!(hash, "Pausing torrent");
        self.pause(hash).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        trace!(hash, "Resuming torrent");
        self.resume(hash).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        trace!(hash, "Re-announcing torrent");
        self.reannounce(hash).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        trace!(hash, delete_data, "Deleting torrent");
        self.delete(hash, delete_data).await
    }

    async fn set_label(&self, hash: &str, label: &str) -> Result<(), ClientError>;

    /// Free space in bytes at `path` as seen by the client
    async fn free_space(&self, path: &str) -> Result<i64, ClientError>;

    /// Tag operations, when the client supports them
    fn as_tag_client(&self) -> Option<&dyn TagClient> {
        None
    }
}

/// Optional tag capability
#[async_trait]
pub trait TagClient: Send + Sync {
    async fn add_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError>;

    async fn remove_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError>;

    async fn create_tags(&self, tags: &[String]) -> Result<(), ClientError>;

    async fn delete_tags(&self, tags: &[String]) -> Result<(), ClientError>;
}

/// Build the adapter matching a client's connection settings
pub fn new_client(
    name: &str,
    connection: &ConnectionConfig,
) -> Result<Box<dyn TorrentClient>, ClientError> {
    let client: Box<dyn TorrentClient> = match connection {
        ConnectionConfig::Qbittorrent(config) => Box::new(QBittorrent::new(name, config)?),
        ConnectionConfig::Deluge(config) => Box::new(Deluge::new(name, config)?),
    };
    Ok(client)
}

/// Whether a qBittorrent style tracker entry is a pseudo tracker
pub(crate) fn is_pseudo_tracker(url: &str) -> bool {
    ["[DHT]", "[LSD]", "[PeX]"]
        .iter()
        .any(|marker| url.contains(marker))
}
