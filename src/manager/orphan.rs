//! Removal of files and folders in a download path that no torrent owns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, trace, warn};
use walkdir::WalkDir;

use crate::stores::TorrentFileMap;
use crate::utils::bytes::ibytes;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrphanSummary {
    pub files: usize,
    pub folders: usize,
    pub failures: usize,
    pub reclaimed_bytes: i64,
}

/// Remove every path under `root` not referenced by a torrent in `file_map`
///
/// Files go first, then folders deepest first, so folders emptied by the file
/// pass can be removed. Folders that still hold content fail and are counted.
pub fn remove_orphans(
    root: &Path,
    file_map: &TorrentFileMap,
    mapping: &BTreeMap<String, String>,
    dry_run: bool,
) -> OrphanSummary {
    let mut files: Vec<(PathBuf, u64)> = Vec::new();
    let mut folders: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "Failed reading path, skipping");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            folders.push(entry.into_path());
        } else {
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or_default();
            files.push((entry.into_path(), size));
        }
    }
    info!(root = %root.display(), files = files.len(), folders = folders.len(), "Retrieved local paths");

    let mut summary = OrphanSummary::default();

    for (path, size) in files {
        if file_map.has_path(&path.to_string_lossy(), mapping) {
            continue;
        }
        if remove(&path, dry_run, |path| fs::remove_file(path)) {
            summary.files += 1;
            summary.reclaimed_bytes += size as i64;
        } else {
            summary.failures += 1;
        }
    }

    folders.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    for path in folders {
        if file_map.has_path(&path.to_string_lossy(), mapping) {
            continue;
        }
        if remove(&path, dry_run, |path| fs::remove_dir(path)) {
            summary.folders += 1;
        } else {
            summary.failures += 1;
        }
    }

    info!(
        files = summary.files,
        folders = summary.folders,
        failures = summary.failures,
        reclaimed_space = %ibytes(summary.reclaimed_bytes),
        "Removed orphans"
    );
    summary
}

fn remove(path: &Path, dry_run: bool, op: fn(&Path) -> std::io::Result<()>) -> bool {
    info!(path = %path.display(), "Removing orphan");
    if dry_run {
        warn!("Dry-run enabled, skipping remove");
        return true;
    }

    match op(path) {
        Ok(()) => {
            trace!(path = %path.display(), "Removed");
            true
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "Failed removing orphan");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Snapshot, Torrent};
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn file_map(files: &[String]) -> TorrentFileMap {
        let torrent = Torrent {
            hash: "abc123".to_string(),
            files: files.to_vec(),
            ..Default::default()
        };
        let snapshot: Snapshot = [(torrent.hash.clone(), torrent)].into();
        TorrentFileMap::new(&snapshot)
    }

    fn layout() -> (TempDir, Vec<String>) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let owned = vec![
            write(root, "movie.mkv", "movie").to_string_lossy().into_owned(),
            write(root, "show/episode.mkv", "episode").to_string_lossy().into_owned(),
        ];
        write(root, "leftover.nfo", "12345");
        write(root, "old/release/sample.mkv", "1234567890");
        (dir, owned)
    }

    #[test]
    fn test_removes_unowned_files_and_folders() {
        let (dir, owned) = layout();
        let root = dir.path();

        let summary = remove_orphans(root, &file_map(&owned), &BTreeMap::new(), false);

        assert_eq!(
            summary,
            OrphanSummary {
                files: 2,
                folders: 2,
                failures: 0,
                reclaimed_bytes: 15,
            }
        );
        assert!(root.join("movie.mkv").exists());
        assert!(root.join("show/episode.mkv").exists());
        assert!(!root.join("leftover.nfo").exists());
        assert!(!root.join("old").exists());
    }

    #[test]
    fn test_dry_run_keeps_everything() {
        let (dir, owned) = layout();
        let root = dir.path();

        let summary = remove_orphans(root, &file_map(&owned), &BTreeMap::new(), true);

        assert_eq!(summary.files, 2);
        assert_eq!(summary.folders, 2);
        assert!(root.join("leftover.nfo").exists());
        assert!(root.join("old/release/sample.mkv").exists());
    }

    #[test]
    fn test_mapping_translates_client_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "movie.mkv", "movie");

        let map = file_map(&["/data/torrents/movie.mkv".to_string()]);
        let mapping = BTreeMap::from([(
            "/data/torrents".to_string(),
            root.to_string_lossy().into_owned(),
        )]);

        let summary = remove_orphans(root, &map, &mapping, false);
        assert_eq!(summary, OrphanSummary::default());
        assert!(root.join("movie.mkv").exists());
    }

    #[test]
    fn test_parent_of_owned_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let owned = write(root, "pack/keep.mkv", "keep").to_string_lossy().into_owned();
        write(root, "pack/extra/notes.txt", "n");

        let summary = remove_orphans(root, &file_map(&[owned]), &BTreeMap::new(), false);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.folders, 1);
        assert_eq!(summary.failures, 0);
        assert!(root.join("pack/keep.mkv").exists());
    }
}
