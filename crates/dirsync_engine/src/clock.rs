//! Injectable sleeping and cooperative cancellation for the sync loop.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Suspends the loop between cycles.
pub trait Sleeper: Send {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps without blocking.
///
/// Clones share the same record. Optionally cancels a [`CancelHandle`] once
/// a number of sleeps has been requested, which lets tests bound `run()`.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
    cancel_after: Option<(usize, CancelHandle)>,
}

impl RecordingSleeper {
    /// Creates a recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels `handle` after `sleeps` sleeps have been requested.
    pub fn cancel_after(mut self, sleeps: usize, handle: CancelHandle) -> Self {
        self.cancel_after = Some((sleeps, handle));
        self
    }

    /// Sleeps requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    /// Sum of all requested sleeps.
    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        let mut slept = self.slept.lock();
        slept.push(duration);
        if let Some((limit, handle)) = &self.cancel_after {
            if slept.len() >= *limit {
                handle.cancel();
            }
        }
    }
}

/// Shared flag asking a running loop to stop after the current step.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears the request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
