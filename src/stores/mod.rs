pub mod file_map;

pub use file_map::TorrentFileMap;
