//! Bounded retry with exponential backoff
//!
//! One logical request runs as up to `max_attempts` physical attempts, each
//! under its own timeout. Between attempts the executor waits
//! `min(min_wait * 2^(attempt-1), max_wait)`. Attempts and waits are raced
//! against a caller cancellation signal and an optional overall deadline.

use std::future::{pending, Future};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

use super::ApiError;
use crate::config::RetryConfig;

/// Retry bounds for one logical request
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub attempt_timeout: Duration,
    /// Cap on the whole request including waits
    pub overall_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
            overall_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            min_wait: config.min_wait,
            max_wait: config.max_wait,
            attempt_timeout: config.attempt_timeout,
            overall_timeout: config.overall_timeout,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }
}

/// Outcome of a single physical attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Worth another try: transport failure, timeout, 5xx
    #[error("{0}")]
    Transient(String),
    /// The remote side refused for good
    #[error("{0}")]
    Terminal(String),
}

impl From<ApiError> for AttemptError {
    fn from(error: ApiError) -> Self {
        if error.is_retryable() {
            AttemptError::Transient(error.to_string())
        } else {
            AttemptError::Terminal(error.to_string())
        }
    }
}

/// Why a logical request gave up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    #[error("all {attempts} attempts failed, last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("attempt {attempts} failed permanently: {error}")]
    Terminal { attempts: u32, error: String },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("overall deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Terminal { attempts, .. }
            | RetryError::Cancelled { attempts }
            | RetryError::DeadlineExceeded { attempts } => *attempts,
        }
    }
}

/// A successful value and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Sending half of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half of a cancellation signal, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling
                pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancel handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending::<()>().await,
    }
}

/// Retrying, timeout-bounded request executor
#[derive(Debug, Clone, Default)]
pub struct ResilientClient {
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails terminally or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        mut op: F,
        cancel: &CancelSignal,
    ) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut cancel = cancel.clone();
        let deadline = self.policy.overall_timeout.map(|d| Instant::now() + d);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = deadline_reached(deadline) => {
                    return Err(RetryError::DeadlineExceeded { attempts: attempt });
                }
                result = timeout(self.policy.attempt_timeout, op(attempt)) => result,
            };

            match outcome {
                Ok(Ok(value)) => {
                    debug!("Request succeeded on attempt {}/{}", attempt, max_attempts);
                    return Ok(Attempted { value, attempts: attempt });
                }
                Ok(Err(AttemptError::Terminal(error))) => {
                    warn!("Attempt {} failed permanently: {}", attempt, error);
                    return Err(RetryError::Terminal {
                        attempts: attempt,
                        error,
                    });
                }
                Ok(Err(AttemptError::Transient(error))) => {
                    last_error = error;
                }
                Err(_) => {
                    last_error = format!(
                        "attempt timed out after {:?}",
                        self.policy.attempt_timeout
                    );
                }
            }

            if attempt < max_attempts {
                let wait = self.policy.backoff(attempt);
                warn!(
                    "Attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, max_attempts, wait, last_error
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                    _ = deadline_reached(deadline) => {
                        return Err(RetryError::DeadlineExceeded { attempts: attempt });
                    }
                    _ = sleep(wait) => {}
                }
            }
        }

        warn!("Giving up after {} attempts: {}", max_attempts, last_error);
        Err(RetryError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_wait: Duration::from_millis(100),
            max_wait: Duration::from_millis(350),
            attempt_timeout: Duration::from_secs(1),
            overall_timeout: None,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let client = ResilientClient::new(policy(3));
        let calls = Arc::new(AtomicU32::new(0));

        let result = client
            .execute(
                |attempt| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if attempt == 1 {
                            Err(AttemptError::Transient("503".into()))
                        } else {
                            Ok("done")
                        }
                    }
                },
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_times_out() {
        let client = ResilientClient::new(policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<Attempted<()>, _> = client
            .execute(
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        pending::<Result<(), AttemptError>>().await
                    }
                },
                &CancelSignal::never(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 3 timeouts of 1s plus waits of 100ms and 200ms
        assert_eq!(started.elapsed(), Duration::from_millis(3300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let client = ResilientClient::new(policy(5));
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<Attempted<()>, _> = client
            .execute(
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(AttemptError::Terminal("400 bad action".into()))
                    }
                },
                &CancelSignal::never(),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Terminal { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let mut slow = policy(3);
        slow.min_wait = Duration::from_secs(3600);
        slow.max_wait = Duration::from_secs(3600);
        let client = ResilientClient::new(slow);
        let (handle, signal) = cancel_pair();

        let task = tokio::spawn(async move {
            client
                .execute(
                    |_| async { Err::<(), _>(AttemptError::Transient("down".into())) },
                    &signal,
                )
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert_eq!(result, Err(RetryError::Cancelled { attempts: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline() {
        let mut bounded = policy(10);
        bounded.overall_timeout = Some(Duration::from_millis(1500));
        let client = ResilientClient::new(bounded);

        let result: Result<Attempted<()>, _> = client
            .execute(
                |_| pending::<Result<(), AttemptError>>(),
                &CancelSignal::never(),
            )
            .await;

        assert!(matches!(result, Err(RetryError::DeadlineExceeded { attempts: 2 })));
    }

    #[test]
    fn test_api_error_classification() {
        let transient: AttemptError = ApiError::Status {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(matches!(transient, AttemptError::Transient(_)));

        let terminal: AttemptError = ApiError::Status {
            status: 422,
            body: "bad params".into(),
        }
        .into();
        assert!(matches!(terminal, AttemptError::Terminal(_)));
    }
}
