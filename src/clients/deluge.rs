use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use super::{TorrentClient, REQUEST_TIMEOUT};
use crate::core::config::DelugeConfig;
use crate::core::error::ClientError;
use crate::models::{Snapshot, Torrent};
use crate::utils::time::seconds_since;

/// Status keys requested for every torrent
const TORRENT_FIELDS: &[&str] = &[
    "name",
    "download_location",
    "total_size",
    "total_done",
    "state",
    "files",
    "is_seed",
    "ratio",
    "time_added",
    "active_time",
    "seeding_time",
    "label",
    "total_seeds",
    "total_peers",
    "tracker_host",
    "tracker_status",
];

/// Deluge Web UI JSON-RPC adapter
pub struct Deluge {
    name: String,
    client: reqwest::Client,
    rpc_url: String,
    password: String,
    host: Option<String>,
    next_id: AtomicU64,
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TorrentStatus {
    #[serde(default)]
    name: String,
    #[serde(default)]
    download_location: String,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    total_done: i64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    files: Vec<TorrentFile>,
    #[serde(default)]
    is_seed: bool,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    time_added: f64,
    #[serde(default)]
    active_time: i64,
    #[serde(default)]
    seeding_time: i64,
    #[serde(default)]
    label: String,
    #[serde(default)]
    total_seeds: i64,
    #[serde(default)]
    total_peers: i64,
    #[serde(default)]
    tracker_host: String,
    #[serde(default)]
    tracker_status: String,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    path: String,
}

impl Deluge {
    pub fn new(name: &str, config: &DelugeConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            name: name.to_string(),
            client,
            rpc_url: format!("{}/json", config.url.trim_end_matches('/')),
            password: config.password.clone(),
            host: config.host.clone(),
            next_id: AtomicU64::new(0),
            connected: false,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(client = %self.name, method, id, "Deluge request");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&json!({ "method": method, "params": params, "id": id }))
            .send()
            .await
            .map_err(|source| ClientError::Request { op: method, source })?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                op: method,
                status: response.status(),
            });
        }

        let reply: RpcResponse = response.json().await.map_err(|e| ClientError::Decode {
            op: method,
            reason: e.to_string(),
        })?;

        if let Some(error) = reply.error {
            return Err(ClientError::Rpc {
                method: method.to_string(),
                message: error.message,
            });
        }

        serde_json::from_value(reply.result).map_err(|e| ClientError::Decode {
            op: method,
            reason: e.to_string(),
        })
    }

    async fn ensure_daemon(&self) -> Result<(), ClientError> {
        let connected: bool = self.call("web.connected", json!([])).await?;
        if connected {
            return Ok(());
        }

        let host = match &self.host {
            Some(host) => host.clone(),
            None => {
                // entries are [id, address, port, status]
                let hosts: Vec<Vec<Value>> = self.call("web.get_hosts", json!([])).await?;
                hosts
                    .first()
                    .and_then(|entry| entry.first())
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::Rpc {
                        method: "web.get_hosts".to_string(),
                        message: "no daemon hosts configured".to_string(),
                    })?
            }
        };

        debug!(client = %self.name, host = %host, "Connecting Web UI to daemon");
        let _: Value = self.call("web.connect", json!([host])).await?;

        let connected: bool = self.call("web.connected", json!([])).await?;
        if !connected {
            return Err(ClientError::Rpc {
                method: "web.connect".to_string(),
                message: format!("daemon {} did not connect", host),
            });
        }

        Ok(())
    }
}

fn to_torrent(hash: String, status: TorrentStatus) -> Torrent {
    let location = Path::new(&status.download_location);
    let files = status
        .files
        .iter()
        .map(|file| location.join(&file.path).to_string_lossy().into_owned())
        .collect();

    let added_seconds = if status.time_added > 0.0 {
        seconds_since(status.time_added as i64)
    } else {
        status.active_time
    };

    Torrent {
        hash,
        name: status.name,
        path: status.download_location.clone(),
        total_bytes: status.total_size,
        downloaded_bytes: status.total_done,
        state: status.state,
        files,
        downloaded: status.total_done >= status.total_size,
        seeding: status.is_seed,
        ratio: status.ratio,
        added_seconds,
        seeding_seconds: status.seeding_time,
        label: status.label,
        tags: BTreeSet::new(),
        seeds: status.total_seeds,
        peers: status.total_peers,
        tracker_name: status.tracker_host,
        tracker_status: status.tracker_status,
        tracker_unregistered: false,
    }
}

#[async_trait]
impl TorrentClient for Deluge {
    fn kind(&self) -> &'static str {
        "deluge"
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        let authenticated: bool = self.call("auth.login", json!([self.password])).await?;
        if !authenticated {
            return Err(ClientError::Login(format!(
                "{}: password rejected",
                self.name
            )));
        }

        self.ensure_daemon().await?;

        debug!(client = %self.name, "Connected to Deluge");
        self.connected = true;
        Ok(())
    }

    async fn torrents(&self) -> Result<Snapshot, ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        trace!(client = %self.name, "Retrieving torrents");
        let statuses: HashMap<String, TorrentStatus> = self
            .call("core.get_torrents_status", json!([{}, TORRENT_FIELDS]))
            .await?;
        trace!(client = %self.name, torrents = statuses.len(), "Retrieved torrents");

        Ok(statuses
            .into_iter()
            .map(|(hash, status)| (hash.clone(), to_torrent(hash, status)))
            .collect())
    }

    async fn pause(&self, hash: &str) -> Result<(), ClientError> {
        let _: Value = self.call("core.pause_torrents", json!([[hash]])).await?;
        Ok(())
    }

    async fn resume(&self, hash: &str) -> Result<(), ClientError> {
        let _: Value = self.call("core.resume_torrents", json!([[hash]])).await?;
        Ok(())
    }

    async fn reannounce(&self, hash: &str) -> Result<(), ClientError> {
        let _: Value = self.call("core.force_reannounce", json!([[hash]])).await?;
        Ok(())
    }

    async fn delete(&self, hash: &str, delete_data: bool) -> Result<bool, ClientError> {
        self.call("core.remove_torrent", json!([hash, delete_data]))
            .await
    }

    async fn set_label(&self, hash: &str, label: &str) -> Result<(), ClientError> {
        let _: Value = self.call("label.set_torrent", json!([hash, label])).await?;
        Ok(())
    }

    async fn free_space(&self, path: &str) -> Result<i64, ClientError> {
        self.call("core.get_free_space", json!([path])).await
    }
}
