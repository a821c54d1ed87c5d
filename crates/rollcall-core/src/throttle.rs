//! Throttle-aware wrapper for provider calls.
//!
//! The provider signals overload with an explicit wait duration
//! ([`AppError::Throttled`]). Every remote call in the engine goes through
//! [`ThrottledCaller::call`], which honors that signal exactly once per
//! call: sleep the requested wait plus a safety margin, then replay the
//! operation. A second throttle on the retry propagates to the caller;
//! loops decide whether to pause harder or skip the work item.
//!
//! Cancellation is checked before the first attempt and before sleeping, and
//! the backoff sleep itself races the job's [`CancellationToken`], so a
//! cancelled job never waits out a long backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::AppError;

/// Wraps replayable provider operations with single-retry throttle handling.
#[derive(Debug, Clone)]
pub struct ThrottledCaller {
    /// Extra wait added on top of every provider-requested backoff.
    margin: Duration,
}

impl ThrottledCaller {
    pub fn new(margin: Duration) -> Self {
        Self { margin }
    }

    /// Runs `op`, retrying exactly once after a throttle signal.
    ///
    /// `op` must be replayable: calling it again issues the same request.
    /// Non-throttle errors are never retried. Returns
    /// [`AppError::Cancelled`] without issuing a call when the token is
    /// already set.
    pub async fn call<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op_name: &'static str,
        mut op: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        match op().await {
            Err(AppError::Throttled { wait }) => {
                warn!(
                    op = op_name,
                    wait_secs = wait.as_secs(),
                    "Provider throttled the call, backing off"
                );
                self.sleep_out(cancel, wait).await?;
                op().await
            }
            other => other,
        }
    }

    /// Sleeps `wait + margin`, returning early with [`AppError::Cancelled`]
    /// if the job is cancelled mid-backoff.
    pub async fn sleep_out(
        &self,
        cancel: &CancellationToken,
        wait: Duration,
    ) -> Result<(), AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(wait + self.margin) => Ok(()),
        }
    }
}

impl Default for ThrottledCaller {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
