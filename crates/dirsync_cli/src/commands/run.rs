//! Run command implementation.

use super::build_sync_loop;
use crate::settings::Settings;
use tracing::info;

/// Syncs until the process is stopped.
pub fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        host = %settings.endpoint.host,
        tenant = %settings.endpoint.tenant,
        token_path = %settings.token_path.display(),
        "Starting dirsync"
    );
    let mut sync = build_sync_loop(settings)?;
    sync.run()?;
    Ok(())
}
