//! Bounded retry on credential expiry.

use crate::config::RetryConfig;
use crate::error::SyncResult;
use crate::transport::DirectoryTransport;
use tracing::warn;

/// Runs `operation`, re-acquiring the credential and retrying on expiry.
///
/// Each expired attempt invalidates the transport's cached credential before
/// the identical call is repeated. After `retry.attempts()` expired attempts
/// the last `AuthExpired` error is returned. Every other outcome is returned
/// as-is on the first attempt.
///
/// Returns the result together with the number of retries performed.
pub fn with_auth_retry<T, F, R>(
    transport: &T,
    retry: &RetryConfig,
    operation: &str,
    mut call: F,
) -> (SyncResult<R>, u32)
where
    T: DirectoryTransport + ?Sized,
    F: FnMut() -> SyncResult<R>,
{
    let attempts = retry.attempts();
    let mut attempt = 1;

    loop {
        match call() {
            Err(e) if e.is_auth_expired() => {
                transport.invalidate_credentials();
                if attempt >= attempts {
                    warn!(operation, attempts, error = %e, "Credential retries exhausted");
                    return (Err(e), attempt - 1);
                }
                warn!(operation, attempt, "Credential expired, re-acquiring and retrying");
                attempt += 1;
            }
            result => return (result, attempt - 1),
        }
    }
}
