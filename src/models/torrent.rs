use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const SECONDS_PER_HOUR: f64 = 60.0 * 60.0;
const SECONDS_PER_DAY: f64 = SECONDS_PER_HOUR * 24.0;

/// Tracker messages that mean the tracker no longer knows the torrent
const UNREGISTERED_STATUSES: &[&str] = &[
    "not registered with this tracker",
    "torrent is not authorized for use on this tracker",
    "torrent is not found",
    "torrent not found",
    "torrent has been nuked",
    "torrent does not exist",
    "unregistered torrent",
];

/// Torrents of one client keyed by hash
pub type Snapshot = BTreeMap<String, Torrent>;

/// Read-only view of one torrent as reported by a client
#[derive(Clone, Debug, Default, Serialize)]
pub struct Torrent {
    pub hash: String,
    pub name: String,
    /// Save path reported by the client
    pub path: String,
    pub total_bytes: i64,
    pub downloaded_bytes: i64,
    pub state: String,
    /// Absolute paths of every file in the torrent
    pub files: Vec<String>,
    pub downloaded: bool,
    pub seeding: bool,
    pub ratio: f64,
    pub added_seconds: i64,
    pub seeding_seconds: i64,
    pub label: String,
    pub tags: BTreeSet<String>,
    pub seeds: i64,
    pub peers: i64,
    /// Registrable domain of the active tracker
    pub tracker_name: String,
    pub tracker_status: String,
    /// Set when a tracker API reported the torrent as unregistered
    pub tracker_unregistered: bool,
}

impl Torrent {
    pub fn added_hours(&self) -> f64 {
        self.added_seconds as f64 / SECONDS_PER_HOUR
    }

    pub fn added_days(&self) -> f64 {
        self.added_seconds as f64 / SECONDS_PER_DAY
    }

    pub fn seeding_hours(&self) -> f64 {
        self.seeding_seconds as f64 / SECONDS_PER_HOUR
    }

    pub fn seeding_days(&self) -> f64 {
        self.seeding_seconds as f64 / SECONDS_PER_DAY
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether the tracker status message marks this torrent as unregistered
    pub fn has_unregistered_status(&self) -> bool {
        if self.tracker_status.is_empty() {
            return false;
        }

        let status = self.tracker_status.to_lowercase();
        UNREGISTERED_STATUSES
            .iter()
            .any(|candidate| status.contains(candidate))
    }

    pub fn is_unregistered(&self) -> bool {
        self.tracker_unregistered || self.has_unregistered_status()
    }
}
