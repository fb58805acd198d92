use tracing::{info, warn};

/// Report the running version; self-update is not available
pub fn run() {
    info!(version = env!("CARGO_PKG_VERSION"), "Running tqm");
    warn!("Command has not been implemented yet!");
}
