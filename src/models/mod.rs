pub mod torrent;

pub use torrent::{Snapshot, Torrent};
