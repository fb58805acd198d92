//! Private tracker APIs consulted to confirm a torrent is unregistered.

pub mod bhd;
pub mod http;
pub mod ptp;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::config::TrackersConfig;
use crate::core::error::TrackerError;
use crate::models::{Snapshot, Torrent};

pub use bhd::Bhd;
pub use ptp::Ptp;

#[async_trait]
pub trait Tracker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this tracker serves the given tracker host
    fn check(&self, host: &str) -> bool;

    async fn is_unregistered(&self, torrent: &Torrent) -> Result<bool, TrackerError>;
}

/// Trackers with API credentials configured
#[derive(Default)]
pub struct Trackers {
    trackers: Vec<Box<dyn Tracker>>,
}

impl Trackers {
    pub fn from_config(config: &TrackersConfig) -> Result<Self, TrackerError> {
        let mut trackers = Self::default();

        if let Some(bhd) = config.bhd.as_ref().filter(|bhd| !bhd.api_key.is_empty()) {
            trackers.push(Box::new(Bhd::new(bhd)?));
        }
        if let Some(ptp) = config
            .ptp
            .as_ref()
            .filter(|ptp| !ptp.api_user.is_empty() && !ptp.api_key.is_empty())
        {
            trackers.push(Box::new(Ptp::new(ptp)?));
        }

        Ok(trackers)
    }

    pub fn push(&mut self, tracker: Box<dyn Tracker>) {
        self.trackers.push(tracker);
    }

    /// First tracker serving `host`
    pub fn get(&self, host: &str) -> Option<&dyn Tracker> {
        self.trackers
            .iter()
            .find(|tracker| tracker.check(host))
            .map(|tracker| tracker.as_ref())
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Ask the matching tracker API about every torrent whose status does not
    /// already mark it unregistered. Returns how many were newly flagged.
    pub async fn annotate(&self, snapshot: &mut Snapshot) -> usize {
        if self.is_empty() {
            return 0;
        }

        let mut flagged = 0;
        for torrent in snapshot.values_mut() {
            if torrent.is_unregistered() {
                continue;
            }
            let Some(tracker) = self.get(&torrent.tracker_name) else {
                continue;
            };

            match tracker.is_unregistered(torrent).await {
                Ok(true) => {
                    debug!(tracker = tracker.name(), name = %torrent.name, hash = %torrent.hash, "Tracker reports torrent unregistered");
                    torrent.tracker_unregistered = true;
                    flagged += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        tracker = tracker.name(),
                        name = %torrent.name,
                        hash = %torrent.hash,
                        error = %err,
                        "Failed checking torrent with tracker api"
                    );
                }
            }
        }

        info!(flagged, "Tracker api lookups complete");
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{BhdConfig, PtpConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fake {
        host: &'static str,
        answer: Result<bool, ()>,
        lookups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tracker for Fake {
        fn name(&self) -> &'static str {
            "FAKE"
        }

        fn check(&self, host: &str) -> bool {
            host.contains(self.host)
        }

        async fn is_unregistered(&self, _torrent: &Torrent) -> Result<bool, TrackerError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.answer.map_err(|_| TrackerError::Url {
                tracker: "fake",
                reason: "boom".to_string(),
            })
        }
    }

    fn torrent(hash: &str, tracker_name: &str, status: &str) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: hash.to_string(),
            tracker_name: tracker_name.to_string(),
            tracker_status: status.to_string(),
            ..Default::default()
        }
    }

    fn snapshot(torrents: Vec<Torrent>) -> Snapshot {
        torrents.into_iter().map(|t| (t.hash.clone(), t)).collect()
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = TrackersConfig {
            bhd: Some(BhdConfig {
                api_key: String::new(),
            }),
            ptp: Some(PtpConfig {
                api_user: "user".to_string(),
                api_key: String::new(),
            }),
        };
        assert!(Trackers::from_config(&config).unwrap().is_empty());

        let config = TrackersConfig {
            bhd: Some(BhdConfig {
                api_key: "key".to_string(),
            }),
            ptp: Some(PtpConfig {
                api_user: "user".to_string(),
                api_key: "key".to_string(),
            }),
        };
        let trackers = Trackers::from_config(&config).unwrap();
        assert_eq!(trackers.len(), 2);
        assert_eq!(trackers.get("beyond-hd.me").unwrap().name(), "BHD");
        assert_eq!(trackers.get("passthepopcorn.me").unwrap().name(), "PTP");
        assert!(trackers.get("example.org").is_none());
    }

    #[tokio::test]
    async fn test_annotate_flags_matching_torrents() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut trackers = Trackers::default();
        trackers.push(Box::new(Fake {
            host: "tracker.test",
            answer: Ok(true),
            lookups: lookups.clone(),
        }));

        let mut torrents = snapshot(vec![
            torrent("aaa", "tracker.test", "Working"),
            torrent("bbb", "tracker.test", "Unregistered torrent"),
            torrent("ccc", "other.test", "Working"),
        ]);

        assert_eq!(trackers.annotate(&mut torrents).await, 1);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert!(torrents["aaa"].tracker_unregistered);
        assert!(!torrents["bbb"].tracker_unregistered);
        assert!(torrents["bbb"].is_unregistered());
        assert!(!torrents["ccc"].is_unregistered());
    }

    #[tokio::test]
    async fn test_annotate_treats_failures_as_registered() {
        let mut trackers = Trackers::default();
        trackers.push(Box::new(Fake {
            host: "tracker.test",
            answer: Err(()),
            lookups: Arc::new(AtomicUsize::new(0)),
        }));

        let mut torrents = snapshot(vec![torrent("aaa", "tracker.test", "")]);
        assert_eq!(trackers.annotate(&mut torrents).await, 0);
        assert!(!torrents["aaa"].is_unregistered());
    }
}
