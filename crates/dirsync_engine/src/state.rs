//! Sync loop state machine.
//!
//! One cycle fetches a batch from the current continuation token, routes
//! every record through the reconcilers, then persists the batch's token.
//! Cycles run strictly one after another so tokens advance in fetch order.

use crate::clock::{CancelHandle, Sleeper, ThreadSleeper};
use crate::config::SyncConfig;
use crate::continuation::ContinuationStore;
use crate::error::{SyncError, SyncResult};
use crate::journal::ChangeJournal;
use crate::replica::Replica;
use crate::retry::with_auth_retry;
use crate::router::{ChangeRouter, RouteOutcome};
use crate::transport::DirectoryTransport;
use dirsync_protocol::Batch;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The current state of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Between cycles, or not yet started.
    Idle,
    /// Waiting on the differential fetch.
    Fetching,
    /// Routing the records of a fetched batch.
    Processing,
    /// Saving the batch's continuation token.
    Persisting,
    /// Waiting out the failure interval after a failed cycle.
    Backoff,
}

impl SyncState {
    /// Returns true while a cycle is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Fetching | SyncState::Processing | SyncState::Persisting
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles whose token was advanced.
    pub cycles_completed: u64,
    /// Cycles that ended in Backoff.
    pub cycles_failed: u64,
    /// Records applied to the replica.
    pub records_applied: u64,
    /// Records with a kind this client does not replicate.
    pub records_skipped: u64,
    /// Records dropped because routing or reconciliation failed.
    pub records_failed: u64,
    /// Edge endpoints point-fetched from the service.
    pub endpoints_fetched: u64,
    /// Credential retries across fetches and point fetches.
    pub auth_retries: u64,
    /// Last time a token was advanced.
    pub last_sync_time: Option<Instant>,
    /// Last cycle error message.
    pub last_error: Option<String>,
}

/// Per-batch record accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records applied.
    pub applied: u64,
    /// Records of unknown kind.
    pub skipped: u64,
    /// Records that failed and were dropped.
    pub failed: u64,
    /// Endpoints point-fetched while applying edges.
    pub endpoints_fetched: u64,
}

impl BatchReport {
    /// Total records seen.
    pub fn total(&self) -> u64 {
        self.applied + self.skipped + self.failed
    }

    fn merge(&mut self, other: &BatchReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.endpoints_fetched += other.endpoints_fetched;
    }
}

/// Result of one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The batch was processed and its token became current.
    Advanced {
        /// The new continuation token.
        token: String,
        /// Whether the service has more pending data.
        more: bool,
        /// Record accounting for the batch.
        report: BatchReport,
    },
    /// The fetch failed; the token is unchanged.
    Failed {
        /// Why the cycle failed.
        error: SyncError,
    },
}

impl CycleOutcome {
    /// Returns true if the token advanced.
    pub fn is_advanced(&self) -> bool {
        matches!(self, CycleOutcome::Advanced { .. })
    }
}

/// Drives differential sync against a directory service.
pub struct SyncLoop<T: DirectoryTransport, R: Replica, C: ContinuationStore> {
    config: SyncConfig,
    transport: T,
    replica: R,
    store: C,
    router: ChangeRouter,
    sleeper: Box<dyn Sleeper>,
    state: SyncState,
    stats: SyncStats,
    token: Option<String>,
    cancel: CancelHandle,
}

impl<T: DirectoryTransport, R: Replica, C: ContinuationStore> SyncLoop<T, R, C> {
    /// Creates a sync loop. Nothing is read until the first cycle.
    pub fn new(config: SyncConfig, transport: T, replica: R, store: C) -> Self {
        let router = ChangeRouter::new(config.retry.clone());
        Self {
            config,
            transport,
            replica,
            store,
            router,
            sleeper: Box::new(ThreadSleeper),
            state: SyncState::Idle,
            stats: SyncStats::default(),
            token: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Replaces the sleeper used for pacing and backoff.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Journals every classified change before it is applied.
    pub fn with_journal(mut self, journal: impl ChangeJournal + 'static) -> Self {
        self.router = ChangeRouter::new(self.config.retry.clone()).with_journal(journal);
        self
    }

    /// Uses `cancel` instead of the loop's own handle.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the replica.
    pub fn replica(&self) -> &R {
        &self.replica
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the continuation store.
    pub fn store(&self) -> &C {
        &self.store
    }

    /// The current continuation token, once started.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// A handle that stops [`run`](Self::run) between cycles.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Consumes the loop, returning the replica.
    pub fn into_replica(self) -> R {
        self.replica
    }

    /// Loads the persisted token. An absent token means a full initial sync.
    pub fn start(&mut self) -> SyncResult<&str> {
        if self.token.is_none() {
            let token = self.store.read()?.unwrap_or_default();
            if token.is_empty() {
                info!("No continuation token stored, starting a full sync");
            } else {
                info!("Resuming from stored continuation token");
            }
            self.token = Some(token);
        }
        Ok(self.token.as_deref().unwrap_or_default())
    }

    /// Runs one fetch, process and persist cycle.
    ///
    /// Fetch failures are returned as [`CycleOutcome::Failed`] with the
    /// state set to `Backoff`. Only an unreadable continuation store or
    /// cancellation produce `Err`.
    pub fn run_cycle(&mut self) -> SyncResult<CycleOutcome> {
        self.check_cancelled()?;
        let token = self.start()?.to_string();
        let query = self.config.delta_query(&token);

        self.state = SyncState::Fetching;
        let transport = &self.transport;
        let (fetched, retries) =
            with_auth_retry(transport, &self.config.retry, "fetch_changes", || {
                transport.fetch_changes(&query)
            });
        self.stats.auth_retries += u64::from(retries);

        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => return Ok(self.fail_cycle(e)),
        };
        debug!(records = batch.len(), more = batch.more, "Fetched batch");

        self.state = SyncState::Processing;
        let report = self.process(&batch);

        self.state = SyncState::Persisting;
        self.persist(&batch.token);

        self.stats.cycles_completed += 1;
        self.stats.last_sync_time = Some(Instant::now());
        self.stats.last_error = None;
        self.state = SyncState::Idle;

        Ok(CycleOutcome::Advanced {
            token: batch.token,
            more: batch.more,
            report,
        })
    }

    /// Sleeps as the outcome dictates: not at all while more data is
    /// pending, the poll interval once caught up, the backoff interval after
    /// a failure.
    pub fn pace(&mut self, outcome: &CycleOutcome) {
        let wait = match outcome {
            CycleOutcome::Advanced { more: true, .. } => return,
            CycleOutcome::Advanced { more: false, .. } => {
                self.state = SyncState::Idle;
                let wait = self.config.poll_interval;
                info!(
                    "Processed change(s) successfully. Will check back in {}",
                    describe(wait)
                );
                wait
            }
            CycleOutcome::Failed { .. } => {
                self.state = SyncState::Backoff;
                let wait = self.config.backoff_interval();
                info!("Will retry in {}", describe(wait));
                wait
            }
        };
        if !self.cancel.is_cancelled() {
            self.sleeper.sleep(wait);
        }
    }

    /// Runs cycles until cancelled.
    pub fn run(&mut self) -> SyncResult<()> {
        info!(
            resource_set = %self.config.resource_set,
            poll_interval = ?self.config.poll_interval,
            "Starting differential sync"
        );
        loop {
            let outcome = match self.run_cycle() {
                Ok(outcome) => outcome,
                Err(SyncError::Cancelled) => break,
                Err(e) => CycleOutcome::Failed {
                    error: self.record_failure(e),
                },
            };
            self.pace(&outcome);
        }
        info!(stats = ?self.stats, "Sync stopped");
        self.state = SyncState::Idle;
        Ok(())
    }

    /// Runs cycles until a batch with no more pending data is persisted.
    ///
    /// The first failed cycle ends catch-up with its error. Returns the
    /// accumulated record accounting.
    pub fn sync_until_caught_up(&mut self) -> SyncResult<BatchReport> {
        let mut total = BatchReport::default();
        loop {
            match self.run_cycle()? {
                CycleOutcome::Advanced { more, report, .. } => {
                    total.merge(&report);
                    if !more {
                        return Ok(total);
                    }
                }
                CycleOutcome::Failed { error } => return Err(error),
            }
        }
    }

    fn process(&mut self, batch: &Batch) -> BatchReport {
        let mut report = BatchReport::default();
        let retries_before = self.router.auth_retries();
        for (index, record) in batch.records.iter().enumerate() {
            match self.router.route(record, &mut self.replica, &self.transport) {
                Ok(RouteOutcome::Skipped { .. }) => report.skipped += 1,
                Ok(RouteOutcome::Edge { outcome, .. }) => {
                    report.applied += 1;
                    report.endpoints_fetched += outcome.repaired.len() as u64;
                }
                Ok(RouteOutcome::Node { .. }) => report.applied += 1,
                Err(e) => {
                    warn!(index, error = %e, "Failed to apply change, skipping record");
                    report.failed += 1;
                }
            }
        }

        self.stats.auth_retries += self.router.auth_retries() - retries_before;
        self.stats.records_applied += report.applied;
        self.stats.records_skipped += report.skipped;
        self.stats.records_failed += report.failed;
        self.stats.endpoints_fetched += report.endpoints_fetched;
        report
    }

    fn persist(&mut self, token: &str) {
        if let Err(e) = self.store.save(token) {
            error!(error = %e, "Failed to persist continuation token");
        }
        self.token = Some(token.to_string());
    }

    fn fail_cycle(&mut self, e: SyncError) -> CycleOutcome {
        CycleOutcome::Failed {
            error: self.record_failure(e),
        }
    }

    fn record_failure(&mut self, e: SyncError) -> SyncError {
        warn!(error = %e, "Sync cycle failed");
        self.state = SyncState::Backoff;
        self.stats.cycles_failed += 1;
        self.stats.last_error = Some(e.to_string());
        e
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<T, R, C> std::fmt::Debug for SyncLoop<T, R, C>
where
    T: DirectoryTransport,
    R: Replica,
    C: ContinuationStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLoop")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("token", &self.token)
            .finish()
    }
}

fn describe(wait: Duration) -> String {
    let secs = wait.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minute(s)", secs / 60)
    } else if secs > 0 {
        format!("{secs} second(s)")
    } else {
        format!("{} ms", wait.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::config::RetryConfig;
    use crate::continuation::MemoryContinuationStore;
    use crate::replica::MemoryReplica;
    use crate::transport::MockTransport;
    use dirsync_protocol::{RawRecord, RejectionKind};
    use serde_json::{json, Value};
    use std::sync::Arc;

    type TestLoop = SyncLoop<Arc<MockTransport>, MemoryReplica, Arc<MemoryContinuationStore>>;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn user(id: &str) -> RawRecord {
        raw(json!({ "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.User", "objectId": id }))
    }

    fn harness(
        store: MemoryContinuationStore,
    ) -> (TestLoop, Arc<MockTransport>, Arc<MemoryContinuationStore>, RecordingSleeper) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(store);
        let sleeper = RecordingSleeper::new();
        let config = SyncConfig::new()
            .with_poll_interval(Duration::from_secs(30))
            .with_retry(RetryConfig::new(3).with_backoff_interval(Duration::from_secs(5)));
        let sync = SyncLoop::new(
            config,
            Arc::clone(&transport),
            MemoryReplica::new(),
            Arc::clone(&store),
        )
        .with_sleeper(sleeper.clone());
        (sync, transport, store, sleeper)
    }

    #[test]
    fn state_is_active() {
        assert!(SyncState::Fetching.is_active());
        assert!(SyncState::Processing.is_active());
        assert!(SyncState::Persisting.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Backoff.is_active());
    }

    #[test]
    fn start_without_token_is_initial_sync() {
        let (mut sync, transport, _, _) = harness(MemoryContinuationStore::new());
        assert_eq!(sync.token(), None);
        assert_eq!(sync.start().unwrap(), "");

        transport.push_batch(Batch::new(vec![user("a")], "t1", false));
        sync.run_cycle().unwrap();
        assert!(transport.queries()[0].is_initial());
    }

    #[test]
    fn cycle_applies_and_persists() {
        let (mut sync, transport, store, _) = harness(MemoryContinuationStore::with_token("t0"));
        transport.push_batch(Batch::new(vec![user("a"), user("b")], "t1", true));

        let outcome = sync.run_cycle().unwrap();
        match outcome {
            CycleOutcome::Advanced { token, more, report } => {
                assert_eq!(token, "t1");
                assert!(more);
                assert_eq!(report.applied, 2);
                assert_eq!(report.total(), 2);
            }
            CycleOutcome::Failed { error } => panic!("cycle failed: {error}"),
        }
        assert_eq!(transport.queries()[0].token, "t0");
        assert_eq!(store.read().unwrap().as_deref(), Some("t1"));
        assert_eq!(sync.token(), Some("t1"));
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.replica().node_count(), 2);
        assert_eq!(sync.stats().cycles_completed, 1);
    }

    #[test]
    fn rejected_fetch_backs_off_with_same_token() {
        let (mut sync, transport, store, sleeper) =
            harness(MemoryContinuationStore::with_token("t0"));
        transport.push_error(SyncError::rejected(
            RejectionKind::Throttled,
            "Request_ThrottledTemporarily",
            "slow down",
        ));

        let outcome = sync.run_cycle().unwrap();
        assert!(!outcome.is_advanced());
        assert_eq!(sync.state(), SyncState::Backoff);
        assert_eq!(sync.token(), Some("t0"));
        assert_eq!(store.history(), vec!["t0".to_string()]);
        assert_eq!(transport.queries().len(), 1);

        sync.pace(&outcome);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(5)]);
        assert_eq!(sync.stats().cycles_failed, 1);
        assert!(sync.stats().last_error.is_some());
    }

    #[test]
    fn pacing_follows_more_flag() {
        let (mut sync, transport, _, sleeper) = harness(MemoryContinuationStore::new());
        transport.push_batch(Batch::new(vec![], "t1", true));
        transport.push_batch(Batch::new(vec![], "t2", false));

        let first = sync.run_cycle().unwrap();
        sync.pace(&first);
        assert!(sleeper.slept().is_empty());

        let second = sync.run_cycle().unwrap();
        sync.pace(&second);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(30)]);
    }

    #[test]
    fn run_stops_when_cancelled() {
        let (sync, transport, store, _) = harness(MemoryContinuationStore::new());
        let cancel = sync.cancel_handle();
        let sleeper = RecordingSleeper::new().cancel_after(2, cancel);
        let mut sync = sync.with_sleeper(sleeper.clone());

        transport.push_batch(Batch::new(vec![user("a")], "t1", false));
        transport.push_batch(Batch::new(vec![user("b")], "t2", false));
        transport.push_batch(Batch::new(vec![user("c")], "t3", false));

        sync.run().unwrap();
        assert_eq!(sleeper.slept().len(), 2);
        assert_eq!(store.read().unwrap().as_deref(), Some("t2"));
        assert_eq!(transport.pending_batches(), 1);
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn catch_up_stops_at_delta_link() {
        let (mut sync, transport, _, sleeper) = harness(MemoryContinuationStore::new());
        transport.push_batch(Batch::new(vec![user("a")], "t1", true));
        transport.push_batch(Batch::new(vec![user("b"), user("c")], "t2", false));
        transport.push_batch(Batch::new(vec![user("d")], "t3", false));

        let report = sync.sync_until_caught_up().unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(sync.token(), Some("t2"));
        assert_eq!(transport.pending_batches(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn catch_up_returns_cycle_error() {
        let (mut sync, transport, _, _) = harness(MemoryContinuationStore::new());
        transport.push_error(SyncError::Transport("connection refused".into()));
        let err = sync.sync_until_caught_up().unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[test]
    fn describe_intervals() {
        assert_eq!(describe(Duration::from_secs(120)), "2 minute(s)");
        assert_eq!(describe(Duration::from_secs(30)), "30 second(s)");
        assert_eq!(describe(Duration::from_millis(250)), "250 ms");
    }
}
