use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, trace};

use super::{is_pseudo_tracker, TagClient, TorrentClient, REQUEST_TIMEOUT};
use crate::core::config::QbittorrentConfig;
use crate::core::error::ClientError;
use crate::models::{Snapshot, Torrent};
use crate::utils::domain::tracker_domain;
use crate::utils::time::seconds_since;

/// Oldest web API able to serve every call made here
const MIN_API_VERSION: (u32, u32) = (2, 2);
/// Web API release that renamed pause/resume to stop/start
const STOP_START_API_VERSION: (u32, u32) = (2, 11);

const SEEDING_STATES: &[&str] = &["uploading", "stalledUP"];

/// qBittorrent WebUI API v2 adapter
pub struct QBittorrent {
    name: String,
    client: reqwest::Client,
    api_url: String,
    user: String,
    password: String,
    api_version: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    completed: i64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    seeding_time: i64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    num_complete: i64,
    #[serde(default)]
    num_incomplete: i64,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackerEntry {
    url: String,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct MainData {
    server_state: ServerState,
}

#[derive(Debug, Deserialize)]
struct ServerState {
    #[serde(default)]
    free_space_on_disk: i64,
}

/// Parse a `major.minor[.patch]` web API version
fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |minor| minor.parse().ok())?;
    Some((major, minor))
}

/// Split qBittorrent's comma separated tag list
fn parse_tags(tags: &str) -> BTreeSet<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

impl QBittorrent {
    pub fn new(name: &str, config: &QbittorrentConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            name: name.to_string(),
            client,
            api_url: format!("{}/api/v2", config.url.trim_end_matches('/')),
            user: config.user.clone(),
            password: config.password.clone(),
            api_version: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn post(
        &self,
        op: &'static str,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<String, ClientError> {
        let body = serde_urlencoded::to_string(form).map_err(|e| ClientError::Decode {
            op,
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .post(self.endpoint(path))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|source| ClientError::Request { op, source })?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                op,
                status: response.status(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| ClientError::Request { op, source })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        op: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(query)
            .send()
            .await
            .map_err(|source| ClientError::Request { op, source })?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                op,
                status: response.status(),
            });
        }

        response.json::<T>().await.map_err(|e| ClientError::Decode {
            op,
            reason: e.to_string(),
        })
    }

    fn uses_stop_start(&self) -> bool {
        self.api_version
            .is_some_and(|version| version >= STOP_START_API_VERSION)
    }

    async fn torrent(&self, info: TorrentInfo) -> Result<Torrent, ClientError> {
        let hash = info.hash.as_str();

        let files: Vec<TorrentFile> = self
            .get("get torrent files", "torrents/files", &[("hash", hash)])
            .await?;
        let trackers: Vec<TrackerEntry> = self
            .get("get torrent trackers", "torrents/trackers", &[("hash", hash)])
            .await?;

        // first real tracker supplies name and status
        let (tracker_name, tracker_status) = trackers
            .iter()
            .find(|tracker| !is_pseudo_tracker(&tracker.url))
            .map(|tracker| (tracker_domain(&tracker.url), tracker.msg.clone()))
            .unwrap_or_default();

        let save_path = Path::new(&info.save_path);
        let files = files
            .iter()
            .map(|file| save_path.join(&file.name).to_string_lossy().into_owned())
            .collect();

        Ok(Torrent {
            hash: info.hash.clone(),
            name: info.name,
            path: info.save_path.clone(),
            total_bytes: info.size,
            downloaded_bytes: info.completed,
            downloaded: info.completed >= info.size,
            seeding: SEEDING_STATES.contains(&info.state.as_str()),
            state: info.state,
            files,
            ratio: info.ratio,
            added_seconds: seconds_since(info.added_on),
            seeding_seconds: info.seeding_time,
            label: info.category,
            tags: parse_tags(&info.tags),
            seeds: info.num_complete,
            peers: info.num_incomplete,
            tracker_name,
            tracker_status,
            tracker_unregistered: false,
        })
    }
}

#[async_trait]
impl TorrentClient for QBittorrent {
    fn kind(&self) -> &'static str {
        "qbittorrent"
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        let reply = self
            .post(
                "login",
                "auth/login",
                &[
                    ("username", self.user.as_str()),
                    ("password", self.password.as_str()),
                ],
            )
            .await?;
        if reply.trim() != "Ok." {
            return Err(ClientError::Login(format!(
                "{}: credentials rejected",
                self.name
            )));
        }

        let response = self
            .client
            .get(self.endpoint("app/webapiVersion"))
            .send()
            .await
            .map_err(|source| ClientError::Request {
                op: "get api version",
                source,
            })?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                op: "get api version",
                status: response.status(),
            });
        }
        let raw = response.text().await.map_err(|source| ClientError::Request {
            op: "get api version",
            source,
        })?;

        let version = parse_version(&raw)
            .filter(|version| *version >= MIN_API_VERSION)
            .ok_or_else(|| ClientError::UnsupportedVersion(raw.trim().to_string()))?;

        debug!(client = %self.name, api_version = %raw.trim(), "Connected to qBittorrent");
        self.api_version = Some(version);
        Ok(())
    }

    async fn torrents(&self) -> Result<Snapshot, ClientError> {
        if self.api_version.is_none() {
            return Err(ClientError::NotConnected);
        }

        trace!(client = %self.name, "Retrieving torrents");
        let list: Vec<TorrentInfo> = self.get("get torrents", "torrents/info", &[]).await?;
        trace!(client = %self.name, torrents = list.len(), "Retrieved torrents");

        let mut torrents = Snapshot::new();
        for info in list {
            let torrent = self.torrent(info).await?;
            torrents.insert(torrent.hash.clone(), torrent);
        }

        Ok(torrents)
    }

    async fn pause(&self, hash: &str) -> Result<(), ClientError> {
        let path = if self.uses_stop_start() {
            "torrents/stop"
        } else {
            "torrents/pause"
        };
        self.post("pause torrent", path, &[("hashes", hash)]).await?;
        Ok(())
    }

    async fn resume(&self, hash: &str) -> Result<(), ClientError> {
        let path = if self.uses_stop_start() {
            "torrents/start"
        } else {
            "torrents/resume"
        };
        self.post("resume torrent", path, &[("hashes", hash)]).await?;
        Ok(())
    }

    async fn reannounce(&self, hash: &str) -> Result<(), ClientError> {
        self.post("re-announce torrent", "torrents/reannounce", &[("hashes", hash)])
            .await?;
        Ok(())
    }

    async fn delete(&self, hash: &str, delete_data: bool) -> Result<bool, ClientError> {
        let delete_files = if delete_data { "true" } else { "false" };
        self.post(
            "delete torrent",
            "torrents/delete",
            &[("hashes", hash), ("deleteFiles", delete_files)],
        )
        .await?;
        Ok(true)
    }

    async fn set_label(&self, hash: &str, label: &str) -> Result<(), ClientError> {
        self.post(
            "set torrent label",
            "torrents/setCategory",
            &[("hashes", hash), ("category", label)],
        )
        .await?;
        Ok(())
    }

    async fn free_space(&self, _path: &str) -> Result<i64, ClientError> {
        let data: MainData = self
            .get("get main data", "sync/maindata", &[("rid", "0")])
            .await?;
        Ok(data.server_state.free_space_on_disk)
    }

    fn as_tag_client(&self) -> Option<&dyn TagClient> {
        Some(self)
    }
}

#[async_trait]
impl TagClient for QBittorrent {
    async fn add_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError> {
        self.post(
            "add torrent tags",
            "torrents/addTags",
            &[
                ("hashes", hashes.join("|").as_str()),
                ("tags", tags.join(",").as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn remove_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError> {
        self.post(
            "remove torrent tags",
            "torrents/removeTags",
            &[
                ("hashes", hashes.join("|").as_str()),
                ("tags", tags.join(",").as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn create_tags(&self, tags: &[String]) -> Result<(), ClientError> {
        self.post("create tags", "torrents/createTags", &[("tags", tags.join(",").as_str())])
            .await?;
        Ok(())
    }

    async fn delete_tags(&self, tags: &[String]) -> Result<(), ClientError> {
        self.post("delete tags", "torrents/deleteTags", &[("tags", tags.join(",").as_str())])
            .await?;
        Ok(())
    }
}
