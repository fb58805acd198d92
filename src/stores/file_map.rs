use crate::models::torrent::{Snapshot, Torrent};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Index of file paths to the hashes of every torrent that references them
pub struct TorrentFileMap {
    files: HashMap<String, HashSet<String>>,
}

impl TorrentFileMap {
    /// Build the index from a full client snapshot
    pub fn new(torrents: &Snapshot) -> Self {
        let mut map = Self {
            files: HashMap::with_capacity(torrents.len()),
        };
        for torrent in torrents.values() {
            map.add(torrent);
        }
        map
    }

    pub fn add(&mut self, torrent: &Torrent) {
        for file in &torrent.files {
            self.files
                .entry(file.clone())
                .or_default()
                .insert(torrent.hash.clone());
        }
    }

    /// Deregister a torrent, dropping paths that no longer have an owner
    pub fn remove(&mut self, torrent: &Torrent) {
        for file in &torrent.files {
            if let Some(owners) = self.files.get_mut(file) {
                owners.remove(&torrent.hash);
                if owners.is_empty() {
                    self.files.remove(file);
                }
            }
        }
    }

    /// False when any of the torrent's files is shared with another torrent
    pub fn is_unique(&self, torrent: &Torrent) -> bool {
        torrent.files.iter().all(|file| {
            self.files
                .get(file)
                .map_or(true, |owners| owners.len() <= 1)
        })
    }

    /// Whether any tracked path contains `path`
    ///
    /// With a mapping, each tracked path is rewritten once per `from -> to`
    /// entry before the check, so client paths can be compared with local ones.
    pub fn has_path(&self, path: &str, mapping: &BTreeMap<String, String>) -> bool {
        self.files.keys().any(|tracked| {
            if mapping.is_empty() {
                return tracked.contains(path);
            }

            mapping
                .iter()
                .any(|(from, to)| tracked.replacen(from.as_str(), to, 1).contains(path))
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_torrent(hash: &str, files: &[&str]) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn snapshot(torrents: Vec<Torrent>) -> Snapshot {
        torrents.into_iter().map(|t| (t.hash.clone(), t)).collect()
    }

    #[test]
    fn test_exclusive_files_are_unique() {
        let a = create_test_torrent("abc123", &["/downloads/a.mkv", "/downloads/a.nfo"]);
        let b = create_test_torrent("def456", &["/downloads/b.mkv"]);
        let map = TorrentFileMap::new(&snapshot(vec![a.clone(), b.clone()]));

        assert_eq!(map.len(), 3);
        assert!(map.is_unique(&a));
        assert!(map.is_unique(&b));
    }

    #[test]
    fn test_shared_file_is_not_unique() {
        let a = create_test_torrent("def456", &["/downloads/movie.mkv"]);
        let b = create_test_torrent("ghi789", &["/downloads/movie.mkv", "/downloads/extra.srt"]);
        let map = TorrentFileMap::new(&snapshot(vec![a.clone(), b.clone()]));

        assert_eq!(map.len(), 2);
        assert!(!map.is_unique(&a));
        assert!(!map.is_unique(&b));
    }

    #[test]
    fn test_remove_makes_sibling_unique() {
        let a = create_test_torrent("def456", &["/downloads/movie.mkv"]);
        let b = create_test_torrent("ghi789", &["/downloads/movie.mkv"]);
        let mut map = TorrentFileMap::new(&snapshot(vec![a.clone(), b.clone()]));

        map.remove(&a);
        assert!(map.is_unique(&b));
        assert_eq!(map.len(), 1);

        map.remove(&b);
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_unknown_torrent_is_noop() {
        let a = create_test_torrent("abc123", &["/downloads/a.mkv"]);
        let mut map = TorrentFileMap::new(&snapshot(vec![a.clone()]));

        map.remove(&create_test_torrent("zzz999", &["/downloads/other.mkv"]));
        map.remove(&create_test_torrent("zzz999", &["/downloads/a.mkv"]));
        assert_eq!(map.len(), 1);
        assert!(map.is_unique(&a));
    }

    #[test]
    fn test_torrent_without_files_is_unique() {
        let a = create_test_torrent("abc123", &[]);
        let map = TorrentFileMap::new(&snapshot(vec![a.clone()]));
        assert!(map.is_unique(&a));
        assert!(map.is_empty());
    }

    #[test]
    fn test_has_path_substring() {
        let a = create_test_torrent("abc123", &["/downloads/tv/Show/S01E01.mkv"]);
        let map = TorrentFileMap::new(&snapshot(vec![a]));
        let none = BTreeMap::new();

        assert!(map.has_path("/downloads/tv/Show", &none));
        assert!(map.has_path("/downloads/tv/Show/S01E01.mkv", &none));
        assert!(!map.has_path("/downloads/movies", &none));
    }

    #[test]
    fn test_has_path_with_mapping() {
        let a = create_test_torrent("abc123", &["/data/torrents/Show/S01E01.mkv"]);
        let map = TorrentFileMap::new(&snapshot(vec![a]));
        let mapping = BTreeMap::from([("/data/torrents".to_string(), "/mnt/local".to_string())]);

        assert!(map.has_path("/mnt/local/Show/S01E01.mkv", &mapping));
        assert!(!map.has_path("/data/torrents/Show/S01E01.mkv", &mapping));
    }
}
