//! Retry with exponential backoff for driver calls.

use crate::config::RetryConfig;
use crate::error::{Phase, SyncError, SyncResult};
use std::future::Future;
use thinker_driver::{DriverError, DriverResult};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Attempt bookkeeping for one logical driver call.
///
/// Callers loop: check [`Attempts::check_cancelled`], make the call, and on
/// failure hand the error to [`Attempts::failed`], which either waits out
/// the backoff (the call should be retried) or returns the final error.
pub(crate) struct Attempts<'a> {
    retry: &'a RetryConfig,
    cancel: &'a CancellationToken,
    table: &'a str,
    phase: Phase,
    attempt: u32,
}

impl<'a> Attempts<'a> {
    pub(crate) fn new(
        retry: &'a RetryConfig,
        cancel: &'a CancellationToken,
        table: &'a str,
        phase: Phase,
    ) -> Self {
        Self {
            retry,
            cancel,
            table,
            phase,
            attempt: 0,
        }
    }

    pub(crate) fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    pub(crate) fn cancelled(&self) -> SyncError {
        SyncError::Cancelled {
            table: self.table.to_string(),
            phase: self.phase,
        }
    }

    /// Handles a failed attempt.
    ///
    /// Returns `Ok(())` after the backoff delay if the call should be made
    /// again.
    pub(crate) async fn failed(&mut self, error: DriverError) -> SyncResult<()> {
        if !error.is_retryable() {
            return Err(SyncError::from_driver(self.table, self.phase, error));
        }

        self.attempt += 1;
        if self.attempt >= self.retry.max_attempts {
            return Err(SyncError::RetriesExhausted {
                table: self.table.to_string(),
                phase: self.phase,
                attempts: self.attempt,
                source: error,
            });
        }

        let delay = self.retry.delay_for_attempt(self.attempt);
        warn!(
            table = %self.table,
            phase = %self.phase,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient driver failure, retrying"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
pub(crate) async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    cancel: &CancellationToken,
    table: &str,
    phase: Phase,
    mut op: F,
) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let mut attempts = Attempts::new(retry, cancel, table, phase);
    loop {
        attempts.check_cancelled()?;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = op() => Some(result),
        };
        match outcome {
            None => return Err(attempts.cancelled()),
            Some(Ok(value)) => return Ok(value),
            Some(Err(error)) => attempts.failed(error).await?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let retry = RetryConfig::immediate(3);
        let cancel = CancellationToken::new();

        let value = with_retry(&retry, &cancel, "users", Phase::Write, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DriverError::transport_retryable("reset"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_fatal() {
        let calls = &AtomicU32::new(0);
        let retry = RetryConfig::immediate(3);
        let cancel = CancellationToken::new();

        let err = with_retry(&retry, &cancel, "users", Phase::Read, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DriverError::transport_retryable("reset"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let retry = RetryConfig::immediate(5);
        let cancel = CancellationToken::new();

        let err = with_retry(&retry, &cancel, "users", Phase::Write, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DriverError::transport_fatal("bad auth"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Driver { phase: Phase::Write, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let retry = RetryConfig::new(5).with_initial_delay(std::time::Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let task = tokio::spawn(async move {
            with_retry(&retry, &cancel, "users", Phase::Read, || async {
                Err::<(), _>(DriverError::transport_retryable("reset"))
            })
            .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
