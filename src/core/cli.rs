use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::{default_config_dir, DEFAULT_CONFIG_FILE, DEFAULT_LOG_FILE};

/// A CLI torrent queue manager
#[derive(Parser, Debug)]
#[command(name = "tqm", version, about)]
pub struct Cli {
    /// Config folder
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Config file, relative to the config folder unless given
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log file, relative to the config folder unless given
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Verbose level, repeat for more
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Dry run mode
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check torrent client for torrents to remove/relabel
    Manage {
        client: String,
        /// Relabel torrents after removals
        #[arg(long)]
        label: bool,
        /// Retag torrents after removals
        #[arg(long)]
        retag: bool,
    },
    /// Check torrent client for torrents to relabel
    Label { client: String },
    /// Check torrent client for torrents to retag
    Retag {
        client: String,
        /// Filter to use instead of the client's
        #[arg(long)]
        filter: Option<String>,
    },
    /// Remove files in the download path that no torrent references
    Orphan { client: String },
    /// Update to latest release
    Update,
}

impl Cli {
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(default_config_dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.config_dir().join(DEFAULT_CONFIG_FILE))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log
            .clone()
            .unwrap_or_else(|| self.config_dir().join(DEFAULT_LOG_FILE))
    }
}
