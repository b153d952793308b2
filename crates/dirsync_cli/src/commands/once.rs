//! Once command implementation.

use super::build_sync_loop;
use crate::settings::Settings;
use dirsync_engine::ReplicaSnapshot;
use serde::Serialize;

/// Summary of a catch-up run.
#[derive(Debug, Serialize)]
pub struct OnceResult {
    /// Continuation token after catching up.
    pub token: String,
    /// Records applied.
    pub applied: u64,
    /// Records of kinds not replicated.
    pub skipped: u64,
    /// Records dropped after failing.
    pub failed: u64,
    /// Endpoints fetched on demand.
    pub endpoints_fetched: u64,
    /// Replicated nodes and edges.
    pub replica: ReplicaSnapshot,
}

/// Syncs until caught up and prints the outcome.
pub fn run(settings: &Settings, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut sync = build_sync_loop(settings)?;
    let report = sync.sync_until_caught_up()?;

    let result = OnceResult {
        token: sync.token().unwrap_or_default().to_string(),
        applied: report.applied,
        skipped: report.skipped,
        failed: report.failed,
        endpoints_fetched: report.endpoints_fetched,
        replica: sync.replica().snapshot(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &OnceResult) {
    println!("Caught up");
    println!("  Records applied:   {}", result.applied);
    println!("  Records skipped:   {}", result.skipped);
    println!("  Records failed:    {}", result.failed);
    println!("  Endpoints fetched: {}", result.endpoints_fetched);
    println!("  Nodes:             {}", result.replica.nodes.len());
    println!("  Edges:             {}", result.replica.edges.len());
}
