// Application state (AppState)

use crate::core::config::Config;

/// Settings shared by every command for the duration of a run
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,

    /// Log decisions without changing anything on the client or disk
    pub dry_run: bool,
}

impl AppState {
    pub fn new(config: Config, dry_run: bool) -> Self {
        Self { config, dry_run }
    }
}
