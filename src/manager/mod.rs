//! Decides what happens to each torrent and carries it out against the client.

pub mod orphan;

use std::cmp::Reverse;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::clients::TorrentClient;
use crate::core::error::ClientError;
use crate::expression::{EvalEnv, Expressions};
use crate::models::{Snapshot, Torrent};
use crate::stores::TorrentFileMap;
use crate::utils::bytes::{gib, ibytes};

pub use orphan::{remove_orphans, OrphanSummary};

/// Knobs for a management run
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Log decisions and update local state without calling the client
    pub dry_run: bool,
    /// Number of torrents the client should keep at most
    pub retention_limit: Option<usize>,
    /// Pause after each successful removal
    pub remove_delay: Duration,
    /// Pause after each relabel so the client can move data
    pub relabel_delay: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            retention_limit: None,
            remove_delay: Duration::from_secs(1),
            relabel_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreSummary {
    pub ignored: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoveSummary {
    pub hard: usize,
    pub soft: usize,
    pub failures: usize,
    pub errors: usize,
    /// Eligible torrents kept because of the retention limit
    pub retained: usize,
    pub reclaimed_bytes: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelabelSummary {
    pub relabeled: usize,
    pub unchanged: usize,
    pub non_unique: usize,
    pub failures: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetagSummary {
    pub retagged: usize,
    pub unchanged: usize,
    pub failures: usize,
    pub errors: usize,
}

enum Removal {
    Hard(i64),
    Soft,
    Failed,
}

/// Working state of one run against one client
///
/// The working set shrinks as torrents are ignored, removed or fail. The file
/// map only forgets torrents that were actually removed, so uniqueness checks
/// keep accounting for torrents that are still on disk.
pub struct Manager<'a> {
    client: &'a dyn TorrentClient,
    expressions: &'a Expressions,
    options: ManagerOptions,
    torrents: Snapshot,
    file_map: TorrentFileMap,
    free_space: Option<i64>,
}

impl<'a> Manager<'a> {
    pub fn new(
        client: &'a dyn TorrentClient,
        expressions: &'a Expressions,
        torrents: Snapshot,
        free_space: Option<i64>,
        options: ManagerOptions,
    ) -> Self {
        let file_map = TorrentFileMap::new(&torrents);
        info!(files = file_map.len(), "Mapped torrents to unique torrent files");

        Self {
            client,
            expressions,
            options,
            torrents,
            file_map,
            free_space,
        }
    }

    pub fn torrents(&self) -> &Snapshot {
        &self.torrents
    }

    pub fn file_map(&self) -> &TorrentFileMap {
        &self.file_map
    }

    pub fn free_space(&self) -> Option<i64> {
        self.free_space
    }

    fn env(&self) -> EvalEnv {
        EvalEnv {
            free_space: self.free_space,
        }
    }

    /// Drop ignored torrents, and those whose ignore rules fail, from the working set
    pub fn ignore_pass(&mut self) -> IgnoreSummary {
        let mut summary = IgnoreSummary::default();
        let env = self.env();
        let expressions = self.expressions;

        self.torrents
            .retain(|hash, torrent| match expressions.should_ignore(torrent, &env) {
                Ok(false) => true,
                Ok(true) => {
                    trace!(hash = %hash, name = %torrent.name, "Ignoring torrent");
                    summary.ignored += 1;
                    false
                }
                Err(err) => {
                    error!(hash = %hash, name = %torrent.name, error = %err, "Failed determining whether to ignore torrent");
                    summary.errors += 1;
                    false
                }
            });

        info!(ignored = summary.ignored, errors = summary.errors, "Ignore pass complete");
        summary
    }

    /// Hashes of the working set, oldest torrent first
    fn oldest_first(&self) -> Vec<String> {
        let mut order: Vec<(Reverse<i64>, String)> = self
            .torrents
            .values()
            .map(|torrent| (Reverse(torrent.added_seconds), torrent.hash.clone()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, hash)| hash).collect()
    }

    fn should_remove(&mut self, hash: &str, summary: &mut RemoveSummary) -> bool {
        let Some(torrent) = self.torrents.get(hash) else {
            return false;
        };

        match self.expressions.should_remove(torrent, &self.env()) {
            Ok(remove) => {
                if !remove {
                    trace!(hash, name = %torrent.name, "Not removing torrent");
                }
                remove
            }
            Err(err) => {
                error!(hash, name = %torrent.name, error = %err, "Failed determining whether to remove torrent");
                self.torrents.remove(hash);
                summary.errors += 1;
                false
            }
        }
    }

    /// Remove every torrent matching a remove rule, oldest first
    pub async fn remove_pass(&mut self) -> RemoveSummary {
        let mut summary = RemoveSummary::default();
        let order = self.oldest_first();

        match self.options.retention_limit {
            None => {
                // evaluate lazily so later rules see space reclaimed by earlier removals
                for hash in order {
                    if self.should_remove(&hash, &mut summary) {
                        self.remove_one(&hash, &mut summary).await;
                    }
                }
            }
            Some(limit) => {
                let mut eligible = Vec::new();
                for hash in order {
                    if self.should_remove(&hash, &mut summary) {
                        eligible.push(hash);
                    }
                }

                let total = self.torrents.len();
                let kept = total - eligible.len();
                let remove_count = retention_remove_count(kept, eligible.len(), limit);
                summary.retained = eligible.len() - remove_count;
                info!(
                    kept,
                    eligible = eligible.len(),
                    limit,
                    remove_count,
                    "Applying torrent retention limit"
                );

                for hash in &eligible[..remove_count] {
                    self.remove_one(hash, &mut summary).await;
                }
            }
        }

        info!(
            hard = summary.hard,
            soft = summary.soft,
            failures = summary.failures,
            errors = summary.errors,
            retained = summary.retained,
            reclaimed_space = %ibytes(summary.reclaimed_bytes),
            "Remove pass complete"
        );
        summary
    }

    async fn remove_one(&mut self, hash: &str, summary: &mut RemoveSummary) {
        let Some(torrent) = self.torrents.get(hash).cloned() else {
            return;
        };

        let unique = self.file_map.is_unique(&torrent);
        let mode = if unique { "Hard" } else { "Soft" };
        match self.free_space {
            Some(space) => info!(
                mode,
                name = %torrent.name,
                size = %ibytes(torrent.downloaded_bytes),
                free_space_gb = %format!("{:.2}", gib(space)),
                "Removing torrent"
            ),
            None => info!(
                mode,
                name = %torrent.name,
                size = %ibytes(torrent.downloaded_bytes),
                "Removing torrent"
            ),
        }
        log_details(&torrent);

        let outcome = if self.options.dry_run {
            warn!("Dry-run enabled, skipping remove");
            removal(unique, &torrent)
        } else {
            match self.client.remove_torrent(hash, unique).await {
                Ok(true) => {
                    info!(hash, "Removed");
                    tokio::time::sleep(self.options.remove_delay).await;
                    removal(unique, &torrent)
                }
                Ok(false) => {
                    error!(hash, name = %torrent.name, "Client refused to remove torrent");
                    Removal::Failed
                }
                Err(err) => {
                    error!(hash, name = %torrent.name, error = %err, "Failed removing torrent");
                    Removal::Failed
                }
            }
        };

        self.torrents.remove(hash);
        match outcome {
            Removal::Hard(bytes) => {
                if let Some(space) = self.free_space.as_mut() {
                    *space += bytes;
                    trace!(increase = %ibytes(bytes), free_space_gb = %format!("{:.2}", gib(*space)), "Increased free space");
                }
                self.file_map.remove(&torrent);
                summary.reclaimed_bytes += bytes;
                summary.hard += 1;
            }
            Removal::Soft => {
                self.file_map.remove(&torrent);
                summary.soft += 1;
            }
            Removal::Failed => summary.failures += 1,
        }
    }

    /// Move torrents to the label of the first matching label rule
    pub async fn relabel_pass(&mut self) -> RelabelSummary {
        let mut summary = RelabelSummary::default();
        let hashes: Vec<String> = self.torrents.keys().cloned().collect();
        let env = self.env();

        for hash in hashes {
            let Some(torrent) = self.torrents.get(&hash) else {
                continue;
            };

            if !self.file_map.is_unique(torrent) {
                // data shared with another torrent may be moved by the new label
                warn!(hash = %hash, name = %torrent.name, "Skipping non unique torrent");
                summary.non_unique += 1;
                continue;
            }

            let label = match self.expressions.should_relabel(torrent, &env) {
                Ok(Some(label)) => label.to_string(),
                Ok(None) => {
                    trace!(hash = %hash, name = %torrent.name, "Not relabeling torrent");
                    summary.unchanged += 1;
                    continue;
                }
                Err(err) => {
                    error!(hash = %hash, name = %torrent.name, error = %err, "Failed determining whether to relabel torrent");
                    self.torrents.remove(&hash);
                    summary.errors += 1;
                    continue;
                }
            };

            info!(name = %torrent.name, label = %label, "Relabeling torrent");
            log_details(torrent);

            if self.options.dry_run {
                warn!("Dry-run enabled, skipping relabel");
            } else if let Err(err) = self.client.set_label(&hash, &label).await {
                error!(hash = %hash, label = %label, error = %err, "Failed relabeling torrent");
                self.torrents.remove(&hash);
                summary.failures += 1;
                continue;
            } else {
                info!(hash = %hash, "Relabeled");
                tokio::time::sleep(self.options.relabel_delay).await;
            }

            if let Some(torrent) = self.torrents.get_mut(&hash) {
                torrent.label = label;
            }
            summary.relabeled += 1;
        }

        info!(
            relabeled = summary.relabeled,
            unchanged = summary.unchanged,
            non_unique = summary.non_unique,
            failures = summary.failures,
            errors = summary.errors,
            "Relabel pass complete"
        );
        summary
    }

    /// Apply tag rules, or `None` when the client has no tag support
    ///
    /// Fails only when the tags rules may add cannot be created up front.
    pub async fn retag_pass(&mut self) -> Result<Option<RetagSummary>, ClientError> {
        let client = self.client;
        let Some(tag_client) = client.as_tag_client() else {
            warn!(client = client.kind(), "Client does not support tags, skipping retag");
            return Ok(None);
        };

        let creatable: Vec<String> = self.expressions.creatable_tags().into_iter().collect();
        if !creatable.is_empty() {
            if self.options.dry_run {
                warn!(tags = ?creatable, "Dry-run enabled, skipping tag creation");
            } else {
                tag_client.create_tags(&creatable).await?;
                info!(tags = ?creatable, "Verified tags exist on client");
            }
        }

        let mut summary = RetagSummary::default();
        let hashes: Vec<String> = self.torrents.keys().cloned().collect();
        let env = self.env();

        for hash in hashes {
            let Some(torrent) = self.torrents.get(&hash) else {
                continue;
            };

            let changes = match self.expressions.should_retag(torrent, &env) {
                Ok(changes) if changes.is_empty() => {
                    trace!(hash = %hash, name = %torrent.name, "Not retagging torrent");
                    summary.unchanged += 1;
                    continue;
                }
                Ok(changes) => changes,
                Err(err) => {
                    error!(hash = %hash, name = %torrent.name, error = %err, "Failed determining whether to retag torrent");
                    self.torrents.remove(&hash);
                    summary.errors += 1;
                    continue;
                }
            };

            info!(name = %torrent.name, add = ?changes.add, remove = ?changes.remove, "Retagging torrent");
            log_details(torrent);

            if self.options.dry_run {
                warn!("Dry-run enabled, skipping retag");
            } else {
                let hashes = [hash.clone()];
                let remove: Vec<String> = changes.remove.iter().cloned().collect();
                let add: Vec<String> = changes.add.iter().cloned().collect();

                let mut result = Ok(());
                if !remove.is_empty() {
                    result = tag_client.remove_tags(&hashes, &remove).await;
                }
                if result.is_ok() && !add.is_empty() {
                    result = tag_client.add_tags(&hashes, &add).await;
                }

                if let Err(err) = result {
                    error!(hash = %hash, error = %err, "Failed retagging torrent");
                    self.torrents.remove(&hash);
                    summary.failures += 1;
                    continue;
                }
                debug!(hash = %hash, "Retagged");
            }

            if let Some(torrent) = self.torrents.get_mut(&hash) {
                torrent.tags.retain(|tag| !changes.remove.contains(tag));
                torrent.tags.extend(changes.add);
            }
            summary.retagged += 1;
        }

        info!(
            retagged = summary.retagged,
            unchanged = summary.unchanged,
            failures = summary.failures,
            errors = summary.errors,
            "Retag pass complete"
        );
        Ok(Some(summary))
    }
}

/// How many eligible torrents to remove so the client ends up at `limit`
///
/// Nothing is removed when the torrents that stay regardless already reach the limit.
fn retention_remove_count(kept: usize, eligible: usize, limit: usize) -> usize {
    if kept >= limit {
        return 0;
    }
    (kept + eligible).saturating_sub(limit).min(eligible)
}

fn removal(unique: bool, torrent: &Torrent) -> Removal {
    if unique {
        Removal::Hard(torrent.downloaded_bytes)
    } else {
        Removal::Soft
    }
}

fn log_details(torrent: &Torrent) {
    info!(
        ratio = %format!("{:.3}", torrent.ratio),
        seed_days = %format!("{:.3}", torrent.seeding_days()),
        seeds = torrent.seeds,
        label = %torrent.label,
        tracker = %torrent.tracker_name,
        tracker_status = %torrent.tracker_status,
        "Torrent details"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::TagClient;
    use crate::core::config::{FilterConfig, LabelRuleConfig, TagMode, TagRuleConfig};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockClient {
        calls: Mutex<Vec<String>>,
        tags: bool,
        reject: HashSet<String>,
    }

    impl MockClient {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn deletes(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|call| call.starts_with("delete"))
                .collect()
        }
    }

    #[async_trait]
    impl TorrentClient for MockClient {
        fn kind(&self) -> &'static str {
            "mock"
        }

        async fn connect(&mut self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn torrents(&self) -> Result<Snapshot, ClientError> {
            Ok(Snapshot::new())
        }

        async fn pause(&self, _hash: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn reannounce(&self, _hash: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn delete(&self, hash: &str, delete_data: bool) -> Result<bool, ClientError> {
            self.record(format!("delete {} {}", hash, delete_data));
            Ok(!self.reject.contains(hash))
        }

        async fn set_label(&self, hash: &str, label: &str) -> Result<(), ClientError> {
            self.record(format!("label {} {}", hash, label));
            Ok(())
        }

        async fn free_space(&self, _path: &str) -> Result<i64, ClientError> {
            Ok(0)
        }

        fn as_tag_client(&self) -> Option<&dyn TagClient> {
            if self.tags {
                Some(self)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl TagClient for MockClient {
        async fn add_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError> {
            self.record(format!("add {} {}", hashes.join("|"), tags.join(",")));
            Ok(())
        }

        async fn remove_tags(&self, hashes: &[String], tags: &[String]) -> Result<(), ClientError> {
            self.record(format!("remove {} {}", hashes.join("|"), tags.join(",")));
            Ok(())
        }

        async fn create_tags(&self, tags: &[String]) -> Result<(), ClientError> {
            self.record(format!("create {}", tags.join(",")));
            Ok(())
        }

        async fn delete_tags(&self, tags: &[String]) -> Result<(), ClientError> {
            self.record(format!("delete-tags {}", tags.join(",")));
            Ok(())
        }
    }

    fn torrent(hash: &str, ratio: f64, added_seconds: i64, files: &[&str]) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: format!("{}.mkv", hash),
            ratio,
            added_seconds,
            downloaded: true,
            downloaded_bytes: 1_000_000,
            files: files.iter().map(|file| file.to_string()).collect(),
            ..Default::default()
        }
    }

    fn snapshot(torrents: Vec<Torrent>) -> Snapshot {
        torrents.into_iter().map(|t| (t.hash.clone(), t)).collect()
    }

    fn rules(remove: &[&str]) -> Expressions {
        let filter = FilterConfig {
            remove: remove.iter().map(|rule| rule.to_string()).collect(),
            ..Default::default()
        };
        Expressions::compile(&filter).unwrap()
    }

    fn options() -> ManagerOptions {
        ManagerOptions {
            remove_delay: Duration::ZERO,
            relabel_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_torrent_is_hard_removed() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 4.0"]);
        let mut abc = torrent("abc123", 5.0, 100, &["/downloads/abc.mkv"]);
        abc.downloaded_bytes = 4 * 1024 * 1024 * 1024;
        let torrents = snapshot(vec![abc, torrent("keep01", 1.0, 50, &["/downloads/keep.mkv"])]);

        let mut manager = Manager::new(&client, &expressions, torrents, Some(1024), options());
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 1);
        assert_eq!(summary.soft, 0);
        assert_eq!(summary.reclaimed_bytes, 4 * 1024 * 1024 * 1024);
        assert_eq!(manager.free_space(), Some(1024 + 4 * 1024 * 1024 * 1024));
        assert_eq!(client.deletes(), vec!["delete abc123 true".to_string()]);
        assert!(!manager.torrents().contains_key("abc123"));
        assert!(manager.torrents().contains_key("keep01"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_files_soft_then_hard() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 1.0"]);
        let torrents = snapshot(vec![
            torrent("def456", 2.0, 200, &["/downloads/movie.mkv"]),
            torrent("ghi789", 2.0, 100, &["/downloads/movie.mkv"]),
        ]);

        let mut manager = Manager::new(&client, &expressions, torrents, None, options());
        let summary = manager.remove_pass().await;

        assert_eq!((summary.soft, summary.hard), (1, 1));
        assert_eq!(
            client.deletes(),
            vec![
                "delete def456 false".to_string(),
                "delete ghi789 true".to_string()
            ]
        );
        assert!(manager.file_map().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_space_reclaimed_feeds_later_rules() {
        let client = MockClient::default();
        let expressions = rules(&["FreeSpaceSet && FreeSpaceGB() < 2.0"]);
        let mut first = torrent("aaa111", 1.0, 300, &["/downloads/a.mkv"]);
        first.downloaded_bytes = 1024 * 1024 * 1024;
        let torrents = snapshot(vec![
            first,
            torrent("bbb222", 1.0, 200, &["/downloads/b.mkv"]),
        ]);

        let free = 1024 * 1024 * 1024;
        let mut manager = Manager::new(&client, &expressions, torrents, Some(free), options());
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 1);
        assert_eq!(client.deletes(), vec!["delete aaa111 true".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_removal_stays_in_file_map() {
        let client = MockClient {
            reject: HashSet::from(["abc123".to_string()]),
            ..Default::default()
        };
        let expressions = rules(&["Ratio > 4.0"]);
        let torrents = snapshot(vec![torrent("abc123", 5.0, 100, &["/downloads/abc.mkv"])]);

        let mut manager = Manager::new(&client, &expressions, torrents, Some(0), options());
        let summary = manager.remove_pass().await;

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.hard, 0);
        assert_eq!(manager.free_space(), Some(0));
        assert!(manager.torrents().is_empty());
        assert_eq!(manager.file_map().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_removes_only_the_oldest() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 1.0"]);
        let torrents = snapshot(
            (0..10)
                .map(|i| {
                    let hash = format!("hash{:02}", i);
                    let file = format!("/downloads/{}.mkv", hash);
                    torrent(&hash, 2.0, 1000 + i * 10, &[file.as_str()])
                })
                .collect(),
        );

        let options = ManagerOptions {
            retention_limit: Some(7),
            ..options()
        };
        let mut manager = Manager::new(&client, &expressions, torrents, None, options);
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 3);
        assert_eq!(summary.retained, 7);
        assert_eq!(
            client.deletes(),
            vec![
                "delete hash09 true".to_string(),
                "delete hash08 true".to_string(),
                "delete hash07 true".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_counts_kept_torrents() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 1.0"]);
        let torrents = snapshot(vec![
            torrent("old001", 2.0, 300, &["/downloads/1.mkv"]),
            torrent("old002", 2.0, 200, &["/downloads/2.mkv"]),
            torrent("new001", 0.5, 100, &["/downloads/3.mkv"]),
        ]);

        let options = ManagerOptions {
            retention_limit: Some(5),
            ..options()
        };
        let mut manager = Manager::new(&client, &expressions, torrents, None, options);
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 0);
        assert_eq!(summary.retained, 2);
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_removes_nothing_when_kept_reach_limit() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 1.0"]);
        let torrents = snapshot(
            (0..13)
                .map(|i| {
                    let hash = format!("hash{:02}", i);
                    let file = format!("/downloads/{}.mkv", hash);
                    let ratio = if i < 5 { 2.0 } else { 0.5 };
                    torrent(&hash, ratio, 1000 + i * 10, &[file.as_str()])
                })
                .collect(),
        );

        let options = ManagerOptions {
            retention_limit: Some(7),
            ..options()
        };
        let mut manager = Manager::new(&client, &expressions, torrents, None, options);
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 0);
        assert_eq!(summary.retained, 5);
        assert!(client.deletes().is_empty());
        assert_eq!(manager.torrents().len(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_removes_only_the_deficit() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio > 1.0"]);
        let torrents = snapshot(vec![
            torrent("elig01", 2.0, 400, &["/downloads/e1.mkv"]),
            torrent("elig02", 2.0, 300, &["/downloads/e2.mkv"]),
            torrent("elig03", 2.0, 200, &["/downloads/e3.mkv"]),
            torrent("elig04", 2.0, 100, &["/downloads/e4.mkv"]),
            torrent("keep01", 0.5, 500, &["/downloads/k1.mkv"]),
            torrent("keep02", 0.5, 50, &["/downloads/k2.mkv"]),
            torrent("keep03", 0.5, 10, &["/downloads/k3.mkv"]),
        ]);

        let options = ManagerOptions {
            retention_limit: Some(5),
            ..options()
        };
        let mut manager = Manager::new(&client, &expressions, torrents, None, options);
        let summary = manager.remove_pass().await;

        assert_eq!(summary.hard, 2);
        assert_eq!(summary.retained, 2);
        assert_eq!(
            client.deletes(),
            vec![
                "delete elig01 true".to_string(),
                "delete elig02 true".to_string()
            ]
        );
    }

    #[test]
    fn test_retention_remove_count() {
        assert_eq!(retention_remove_count(0, 10, 7), 3);
        assert_eq!(retention_remove_count(8, 5, 7), 0);
        assert_eq!(retention_remove_count(7, 5, 7), 0);
        assert_eq!(retention_remove_count(3, 4, 5), 2);
        assert_eq!(retention_remove_count(1, 2, 5), 0);
        assert_eq!(retention_remove_count(0, 3, 1), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_rule_error_drops_torrent_but_keeps_files() {
        let client = MockClient::default();
        let expressions = rules(&["Ratio / 0 > 1"]);
        let torrents = snapshot(vec![torrent("abc123", 5.0, 100, &["/downloads/abc.mkv"])]);

        let mut manager = Manager::new(&client, &expressions, torrents, Some(0), options());
        let summary = manager.remove_pass().await;

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.hard + summary.soft + summary.failures, 0);
        assert!(client.deletes().is_empty());
        assert!(manager.torrents().is_empty());
        assert_eq!(manager.file_map().len(), 1);
        assert!(manager
            .file_map()
            .has_path("/downloads/abc.mkv", &std::collections::BTreeMap::new()));
        assert_eq!(manager.free_space(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_makes_no_calls() {
        let client = MockClient {
            tags: true,
            ..Default::default()
        };
        let filter = FilterConfig {
            remove: vec!["Ratio > 4.0".to_string()],
            label: vec![LabelRuleConfig {
                name: "archive".to_string(),
                update: vec!["Ratio > 1.0".to_string()],
            }],
            tag: vec![TagRuleConfig {
                name: "seeded".to_string(),
                mode: TagMode::Add,
                update: vec!["Ratio > 1.0".to_string()],
            }],
            ..Default::default()
        };
        let expressions = Expressions::compile(&filter).unwrap();
        let torrents = snapshot(vec![
            torrent("abc123", 5.0, 100, &["/downloads/abc.mkv"]),
            torrent("def456", 2.0, 50, &["/downloads/def.mkv"]),
        ]);

        let options = ManagerOptions {
            dry_run: true,
            ..Default::default()
        };
        let mut manager = Manager::new(&client, &expressions, torrents, Some(0), options);

        let removed = manager.remove_pass().await;
        let relabeled = manager.relabel_pass().await;
        let retagged = manager.retag_pass().await.unwrap().unwrap();

        assert_eq!(removed.hard, 1);
        assert_eq!(manager.free_space(), Some(1_000_000));
        assert_eq!(relabeled.relabeled, 1);
        assert_eq!(retagged.retagged, 1);
        assert_eq!(manager.torrents()["def456"].label, "archive");
        assert!(manager.torrents()["def456"].has_tag("seeded"));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_ignore_pass_is_idempotent() {
        let client = MockClient::default();
        let filter = FilterConfig {
            ignore: vec![r#"Label == "keep""#.to_string(), "Ratio / 0 > 1".to_string()],
            ..Default::default()
        };
        let expressions = Expressions::compile(&filter).unwrap();
        let mut kept = torrent("kept01", 1.0, 10, &[]);
        kept.label = "keep".to_string();
        let mut other = torrent("other1", 1.0, 10, &[]);
        other.label = "tv".to_string();
        let torrents = snapshot(vec![kept, other]);

        let mut manager = Manager::new(&client, &expressions, torrents, None, options());
        let first = manager.ignore_pass();
        assert_eq!(first.ignored, 1);
        assert_eq!(first.errors, 1);
        assert!(manager.torrents().is_empty());

        let second = manager.ignore_pass();
        assert_eq!(second, IgnoreSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relabel_first_match_and_skips_shared() {
        let client = MockClient::default();
        let filter = FilterConfig {
            label: vec![
                LabelRuleConfig {
                    name: "first".to_string(),
                    update: vec!["Ratio > 1.0".to_string()],
                },
                LabelRuleConfig {
                    name: "second".to_string(),
                    update: vec!["Ratio > 0.5".to_string()],
                },
            ],
            ..Default::default()
        };
        let expressions = Expressions::compile(&filter).unwrap();
        let torrents = snapshot(vec![
            torrent("aaa111", 2.0, 10, &["/downloads/a.mkv"]),
            torrent("bbb222", 0.7, 10, &["/downloads/b.mkv"]),
            torrent("ccc333", 2.0, 10, &["/downloads/shared.mkv"]),
            torrent("ddd444", 2.0, 10, &["/downloads/shared.mkv"]),
        ]);

        let mut manager = Manager::new(&client, &expressions, torrents, None, options());
        let summary = manager.relabel_pass().await;

        assert_eq!(summary.relabeled, 2);
        assert_eq!(summary.non_unique, 2);
        assert_eq!(
            client.calls(),
            vec![
                "label aaa111 first".to_string(),
                "label bbb222 second".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_retag_accumulates_rules() {
        let client = MockClient {
            tags: true,
            ..Default::default()
        };
        let filter = FilterConfig {
            tag: vec![
                TagRuleConfig {
                    name: "high-ratio".to_string(),
                    mode: TagMode::Full,
                    update: vec!["Ratio > 2.0".to_string()],
                },
                TagRuleConfig {
                    name: "old".to_string(),
                    mode: TagMode::Add,
                    update: vec!["AddedSeconds > 100".to_string()],
                },
                TagRuleConfig {
                    name: "stale".to_string(),
                    mode: TagMode::Remove,
                    update: vec!["Ratio > 2.0".to_string()],
                },
            ],
            ..Default::default()
        };
        let expressions = Expressions::compile(&filter).unwrap();
        let mut abc = torrent("abc123", 1.0, 500, &["/downloads/abc.mkv"]);
        abc.tags = ["high-ratio".to_string(), "stale".to_string()].into();
        let torrents = snapshot(vec![abc]);

        let mut manager = Manager::new(&client, &expressions, torrents, None, options());
        let summary = manager.retag_pass().await.unwrap().unwrap();

        assert_eq!(summary.retagged, 1);
        assert_eq!(
            client.calls(),
            vec![
                "create high-ratio,old".to_string(),
                "remove abc123 high-ratio,stale".to_string(),
                "add abc123 old".to_string(),
            ]
        );
        let tags: Vec<&String> = manager.torrents()["abc123"].tags.iter().collect();
        assert_eq!(tags, vec!["old"]);
    }

    #[tokio::test]
    async fn test_retag_skipped_without_tag_support() {
        let client = MockClient::default();
        let expressions = rules(&[]);
        let mut manager = Manager::new(&client, &expressions, Snapshot::new(), None, options());
        assert!(manager.retag_pass().await.unwrap().is_none());
    }
}
