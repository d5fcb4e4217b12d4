//! Bounded compare-and-swap retry with exponential backoff and jitter.

use pkg_constants::pool::{
    CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_FACTOR, CONFLICT_RETRY_INITIAL_BACKOFF_MS,
    CONFLICT_RETRY_JITTER, CONFLICT_RETRY_MAX_BACKOFF_MS,
};
use pkg_state::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::error::MutationError;

/// Errors that may mean "someone else wrote first, read again".
pub trait IsConflict {
    fn is_conflict(&self) -> bool;
}

impl IsConflict for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

impl IsConflict for MutationError {
    fn is_conflict(&self) -> bool {
        matches!(self, MutationError::Store(e) if e.is_conflict())
    }
}

impl IsConflict for anyhow::Error {
    fn is_conflict(&self) -> bool {
        self.downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_conflict)
            || self
                .downcast_ref::<MutationError>()
                .is_some_and(IsConflict::is_conflict)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub factor: u32,
    pub max_backoff: Duration,
    /// Fraction of each backoff added as random jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: CONFLICT_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(CONFLICT_RETRY_INITIAL_BACKOFF_MS),
            factor: CONFLICT_RETRY_FACTOR,
            max_backoff: Duration::from_millis(CONFLICT_RETRY_MAX_BACKOFF_MS),
            jitter: CONFLICT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sleep before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let growth = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(growth)
            .min(self.max_backoff)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::rng().random_range(0.0..self.jitter);
        base.mul_f64(1.0 + extra)
    }
}

/// Cooperative cancellation for retry loops. Wraps the same
/// `watch::Receiver<bool>` the server uses for shutdown and leadership loss;
/// `true` means stop.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Option<watch::Receiver<bool>>);

impl Cancellation {
    pub fn never() -> Self {
        Self(None)
    }

    pub fn from_watch(rx: watch::Receiver<bool>) -> Self {
        Self(Some(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested; never if it cannot be.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.0.as_mut() {
            if rx.wait_for(|stop| *stop).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("still conflicting after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("retry cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(E),
}

impl RetryError<anyhow::Error> {
    /// Flatten into an `anyhow::Error`, mapping exhaustion and cancellation
    /// onto their `MutationError` counterparts so callers can still
    /// downcast and classify them.
    pub fn into_anyhow(self, target: &str) -> anyhow::Error {
        match self {
            RetryError::Exhausted { attempts, .. } => MutationError::ConflictRetriesExhausted {
                target: target.to_string(),
                attempts,
            }
            .into(),
            RetryError::Cancelled => MutationError::Cancelled.into(),
            RetryError::Failed(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, runs out
/// of attempts, or is cancelled. Cancellation is only observed between
/// attempts, so an attempt that started always finishes.
pub async fn retry_on_conflict<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &Cancellation,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: IsConflict,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut cancel = cancel.clone();
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_conflict() => return Err(RetryError::Failed(e)),
            Err(e) if attempt >= attempts => {
                return Err(RetryError::Exhausted { attempts, last: e });
            }
            Err(_) => {
                let delay = policy.jittered(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "write conflict, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn make_conflict() -> StoreError {
        StoreError::Conflict {
            key: "/registry/resourcepools/shared".into(),
            expected: Some(1),
            found: Some(2),
        }
    }

    fn make_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
        .with_attempts(attempts)
        .with_initial_backoff(Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
        assert_eq!(policy.backoff(3), Duration::from_millis(250));
        assert_eq!(policy.backoff(10), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_conflicts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, RetryError<StoreError>> =
            retry_on_conflict(&make_policy(5), &Cancellation::never(), |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 { Err(make_conflict()) } else { Ok(attempt) }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let result: Result<(), _> =
            retry_on_conflict(&make_policy(3), &Cancellation::never(), |_| async {
                Err::<(), _>(make_conflict())
            })
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_non_conflict_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_on_conflict(&make_policy(5), &Cancellation::never(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StoreError::Backend("disk gone".into())) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Failed(StoreError::Backend(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_attempts() {
        let (tx, rx) = watch::channel(false);
        let cancel = Cancellation::from_watch(rx);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(&make_policy(10), &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(true);
            async { Err::<(), _>(make_conflict()) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_sender_never_cancels() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let cancel = Cancellation::from_watch(rx);
        let result: Result<u32, RetryError<StoreError>> =
            retry_on_conflict(&make_policy(3), &cancel, |attempt| async move {
                if attempt < 2 { Err(make_conflict()) } else { Ok(attempt) }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }
}
