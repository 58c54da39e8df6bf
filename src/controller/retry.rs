//! # Bounded Retry
//!
//! Fixed-delay, bounded-attempt retry used for the apply/destroy stage.
//!
//! The delay goes through a [`Sleeper`] so callers (and tests) decide whether
//! waiting means real wall-clock time.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use terraform_controller::controller::retry::{RetryPolicy, TokioSleeper};
//!
//! # async fn demo() {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10));
//! let result: Result<u32, _> = policy
//!     .retry(&TokioSleeper, |attempt| async move {
//!         if attempt < 2 { Err("not yet") } else { Ok(attempt) }
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), 2);
//! # }
//! ```

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Something that can wait for a duration
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry with a fixed number of attempts and a fixed delay between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// All attempts failed; carries the error of the final attempt
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetriesExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.last_error)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetriesExhausted<E> {}

impl RetryPolicy {
    /// A policy making at least one attempt
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempts run out
    ///
    /// `operation` receives the 1-based attempt number. The delay is applied
    /// between attempts only, never after the last one.
    pub async fn retry<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut operation: F,
    ) -> Result<T, RetriesExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(RetriesExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "Attempt failed, retrying in {}s: {}",
                        self.delay.as_secs(),
                        err
                    );
                    sleeper.sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
