//! Best-effort calls whose failure must not change a run's outcome
//!
//! The merge controller uses these for write-behind persistence of merge
//! records and for tearing down test sandboxes. Gate evaluation, generation
//! and applying an approved change set must propagate their errors instead.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Delay added per failed attempt in [`fail_open_with_retries`]
pub const RETRY_STEP: Duration = Duration::from_millis(100);

/// Run `f` once; a failure is logged and turned into `None`
///
/// ```no_run
/// use hive_core::fail_open::fail_open;
/// use hive_core::Result;
///
/// async fn persist_status() -> Result<()> {
///     Ok(())
/// }
///
/// # async fn run() {
/// let stored = fail_open("merge_store", persist_status).await;
/// assert!(stored.is_some());
/// # }
/// ```
pub async fn fail_open<F, Fut, T>(operation: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    f().await
        .map_err(|e| warn!("{} failed, continuing: {}", operation, e))
        .ok()
}

/// Run `f` up to `attempts` times, sleeping `RETRY_STEP * n` after the nth
/// failure; gives up with `None` once every attempt has failed
///
/// At least one attempt is always made.
pub async fn fail_open_with_retries<F, Fut, T>(
    operation: &str,
    mut f: F,
    attempts: usize,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match f().await {
            Ok(value) => return Some(value),
            Err(e) => e,
        };

        if attempt >= attempts {
            warn!(
                "{} gave up after {} attempt(s), continuing: {}",
                operation, attempts, err
            );
            return None;
        }
        warn!("{} attempt {}/{} failed: {}", operation, attempt, attempts, err);
        tokio::time::sleep(RETRY_STEP * attempt as u32).await;
    }
}
