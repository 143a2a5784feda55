//! Bounded retry with exponential backoff.
//!
//! Used to wait for elements to render and for the WebDriver process to come
//! up. The operation always runs at least once; it is never retried past the
//! deadline.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total time budget measured from the first attempt.
    pub deadline: Duration,
    /// Sleep after the first failure.
    pub initial: Duration,
    /// Upper bound for a single sleep.
    pub max_interval: Duration,
}

impl Backoff {
    pub const fn new(deadline: Duration, initial: Duration) -> Self {
        Self {
            deadline,
            initial,
            max_interval: Duration::from_millis(500),
        }
    }

    /// A single attempt, no waiting.
    pub const fn once() -> Self {
        Self {
            deadline: Duration::ZERO,
            initial: Duration::ZERO,
            max_interval: Duration::ZERO,
        }
    }

    /// Starts the clock for a sequence of attempts.
    pub fn start(self) -> Poller {
        Poller {
            backoff: self,
            started: Instant::now(),
            interval: self.initial,
            attempts: 1,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Paces repeated attempts of some operation against a [`Backoff`].
///
/// ```ignore
/// let mut poller = backoff.start();
/// loop {
///     match try_once().await {
///         Ok(v) => break Ok(v),
///         Err(e) if poller.wait().await => continue,
///         Err(e) => break Err(e),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Poller {
    backoff: Backoff,
    started: Instant,
    interval: Duration,
    attempts: u32,
}

impl Poller {
    /// Sleeps before the next attempt. Returns `false`, without sleeping, when
    /// that sleep would end past the deadline.
    pub async fn wait(&mut self) -> bool {
        if self.started.elapsed() + self.interval >= self.backoff.deadline {
            return false;
        }
        tracing::trace!(
            attempt = self.attempts,
            delay_ms = self.interval.as_millis() as u64,
            "retrying after backoff"
        );
        tokio::time::sleep(self.interval).await;
        self.interval = self.backoff.next_interval(self.interval);
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Runs `operation` until it succeeds or the deadline would be exceeded,
/// returning the last error in the latter case.
pub async fn retry_with_backoff<T, E, F, Fut>(backoff: Backoff, mut operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut poller = backoff.start();

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !poller.wait().await {
            tracing::debug!(attempts = poller.attempts(), error = %err, "retry deadline reached");
            return Err(err);
        }
    }
}
