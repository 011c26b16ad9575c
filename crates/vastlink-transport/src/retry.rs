use std::time::Duration;

/// How long to keep retrying a connection to a pipe that is not ready yet.
///
/// The stage-control process is usually spawned right before the connect, and
/// its pipe server comes up after an unpredictable delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between attempts. Default: 1 second.
    pub backoff: Duration,
    /// Give up after this long. `None` retries forever.
    pub max_wait: Option<Duration>,
}

impl RetryPolicy {
    /// Default backoff between connection attempts.
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
    /// Default overall connection budget.
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

    /// Retry without any limit.
    pub fn forever() -> Self {
        Self {
            backoff: Self::DEFAULT_BACKOFF,
            max_wait: None,
        }
    }

    /// Retry with the given backoff until `max_wait` has elapsed.
    pub fn bounded(backoff: Duration, max_wait: Duration) -> Self {
        Self {
            backoff,
            max_wait: Some(max_wait),
        }
    }

    /// Returns true once `elapsed` has used up the budget.
    pub fn exhausted(&self, elapsed: Duration) -> bool {
        self.max_wait.is_some_and(|max| elapsed >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded(Self::DEFAULT_BACKOFF, Self::DEFAULT_MAX_WAIT)
    }
}
