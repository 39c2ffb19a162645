//! Opt-in retrying of register operations
//!
//! The register operations themselves never retry. A caller that wants to retry after a phase
//! timed out uses [`SharedRegister::read_with_retry`](crate::SharedRegister::read_with_retry) or
//! [`SharedRegister::write_with_retry`](crate::SharedRegister::write_with_retry) together with a
//! [`Retry`] implementation, usually a [`Backoff`].

use std::time::Duration;

/// How operations in this crate should be retried
pub trait Retry {
    /// Called before every retry, `false` stops retrying
    fn should_retry(&mut self) -> bool;

    /// The time to wait before the next retry, [`None`] retries right away
    fn wait_time(&mut self) -> Option<Duration>;
}

/// Retries forever without waiting
impl Retry for () {
    fn should_retry(&mut self) -> bool {
        true
    }

    fn wait_time(&mut self) -> Option<Duration> {
        None
    }
}

/// The type-erased [`Retry`] accepted by the retrying operations
pub struct RetryStrategy<'r> {
    retry: &'r mut (dyn Retry + Send),
}

impl<'r> RetryStrategy<'r> {
    pub fn new(inner: &'r mut (dyn Retry + Send)) -> Self {
        Self { retry: inner }
    }

    pub(crate) fn should_retry(&mut self) -> bool {
        self.retry.should_retry()
    }

    pub(crate) async fn wait(&mut self) {
        if let Some(dur) = self.retry.wait_time() {
            tokio::time::sleep(dur).await;
        }
    }
}

impl<'r, R> From<&'r mut R> for RetryStrategy<'r>
where
    R: Retry + Send,
{
    fn from(value: &'r mut R) -> Self {
        Self { retry: value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Constant,
    Linear(Duration),
    Exponential(u32),
}

/// A [`Retry`] with an optional limit on the number of retries and a growing delay between them
///
/// # Example
/// ```rust
/// # use abd::retry::{Backoff, Retry};
/// # use std::time::Duration;
/// let mut backoff = Backoff::limited(3).exponential(Duration::from_millis(10), 2);
///
/// assert!(backoff.should_retry());
/// assert_eq!(Some(Duration::from_millis(10)), backoff.wait_time());
/// assert!(backoff.should_retry());
/// assert_eq!(Some(Duration::from_millis(20)), backoff.wait_time());
/// assert!(backoff.should_retry());
/// assert!(!backoff.should_retry());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    limit: Option<usize>,
    retries: usize,
    delay: Option<Duration>,
    growth: Growth,
}

impl Backoff {
    /// Allows at most `limit` retries, without waiting in between
    pub fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            retries: 0,
            delay: None,
            growth: Growth::Constant,
        }
    }

    /// Keeps retrying forever, without waiting in between
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            retries: 0,
            delay: None,
            growth: Growth::Constant,
        }
    }

    /// Always waits `delay` between retries
    pub fn constant(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.growth = Growth::Constant;
        self
    }

    /// Waits `start` before the first retry and `increment` longer for every following one
    pub fn linear(mut self, start: Duration, increment: Duration) -> Self {
        self.delay = Some(start);
        self.growth = Growth::Linear(increment);
        self
    }

    /// Waits `start` before the first retry and multiplies the delay by `factor` afterwards
    pub fn exponential(mut self, start: Duration, factor: u32) -> Self {
        self.delay = Some(start);
        self.growth = Growth::Exponential(factor);
        self
    }

    /// The number of retries granted so far
    pub fn retries(&self) -> usize {
        self.retries
    }
}

impl Retry for Backoff {
    fn should_retry(&mut self) -> bool {
        if let Some(limit) = self.limit {
            if self.retries >= limit {
                return false;
            }
        }

        self.retries = self.retries.saturating_add(1);
        true
    }

    fn wait_time(&mut self) -> Option<Duration> {
        let current = self.delay?;

        self.delay = Some(match self.growth {
            Growth::Constant => current,
            Growth::Linear(increment) => current.saturating_add(increment),
            Growth::Exponential(factor) => current.saturating_mul(factor),
        });

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits() {
        let mut none = Backoff::limited(0);
        assert!(!none.should_retry());

        let mut two = Backoff::limited(2).linear(Duration::from_secs(1), Duration::from_secs(1));
        assert!(two.should_retry());
        assert!(two.should_retry());
        assert!(!two.should_retry());
        assert!(!two.should_retry());
        assert_eq!(2, two.retries());

        let mut forever = Backoff::unlimited();
        assert!((0..1_000).all(|_| forever.should_retry()));
    }

    #[test]
    fn delays() {
        let mut immediate = Backoff::limited(2);
        assert_eq!(None, immediate.wait_time());

        let mut constant = Backoff::unlimited().constant(Duration::from_millis(5));
        assert_eq!(Some(Duration::from_millis(5)), constant.wait_time());
        assert_eq!(Some(Duration::from_millis(5)), constant.wait_time());

        let mut linear =
            Backoff::unlimited().linear(Duration::from_millis(10), Duration::from_millis(5));
        assert_eq!(Some(Duration::from_millis(10)), linear.wait_time());
        assert_eq!(Some(Duration::from_millis(15)), linear.wait_time());
        assert_eq!(Some(Duration::from_millis(20)), linear.wait_time());

        let mut exponential = Backoff::limited(3).exponential(Duration::from_millis(1), 3);
        assert_eq!(Some(Duration::from_millis(1)), exponential.wait_time());
        assert_eq!(Some(Duration::from_millis(3)), exponential.wait_time());
        assert_eq!(Some(Duration::from_millis(9)), exponential.wait_time());
    }

    #[test]
    fn saturating_delay() {
        let mut exponential = Backoff::unlimited().exponential(Duration::MAX, 2);
        assert_eq!(Some(Duration::MAX), exponential.wait_time());
        assert_eq!(Some(Duration::MAX), exponential.wait_time());
    }

    #[tokio::test]
    async fn strategy_waits() {
        let mut backoff = Backoff::limited(1).constant(Duration::from_millis(10));
        let mut strategy = RetryStrategy::from(&mut backoff);

        let start = std::time::Instant::now();
        assert!(strategy.should_retry());
        strategy.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(10));

        assert!(!strategy.should_retry());
    }
}
