//! CLI command implementations.

pub mod once;
pub mod run;
pub mod token;

use crate::http_client::ReqwestClient;
use crate::settings::Settings;
use dirsync_engine::{
    ClientCredentialsProvider, FileContinuationStore, HttpTransport, JsonLinesJournal,
    MemoryReplica, SyncLoop, TokenBroker,
};
use std::sync::Arc;

/// The sync loop as wired by the CLI.
pub type CliSyncLoop = SyncLoop<HttpTransport<ReqwestClient>, MemoryReplica, FileContinuationStore>;

/// Builds a sync loop from settings.
pub fn build_sync_loop(settings: &Settings) -> Result<CliSyncLoop, Box<dyn std::error::Error>> {
    let client = Arc::new(ReqwestClient::new()?);
    let provider = ClientCredentialsProvider::new(
        settings.credentials.clone(),
        settings.endpoint.tenant.clone(),
        Arc::clone(&client),
    );
    let transport = HttpTransport::new(settings.endpoint.clone(), client, TokenBroker::new(provider));
    let store = FileContinuationStore::new(&settings.token_path);

    let mut sync = SyncLoop::new(settings.sync_config(), transport, MemoryReplica::new(), store);
    if let Some(path) = &settings.journal_path {
        sync = sync.with_journal(JsonLinesJournal::open(path)?);
    }
    Ok(sync)
}
