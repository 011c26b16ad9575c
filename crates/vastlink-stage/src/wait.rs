use std::time::Duration;

/// How the controller polls `busy` while waiting for motion to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between `busy` queries. Default: 10 ms.
    pub poll_interval: Duration,
    /// Give up after this long. `None` polls forever.
    pub timeout: Option<Duration>,
}

impl WaitPolicy {
    /// Default delay between `busy` queries.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
    /// Default overall wait budget.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Poll until idle without any limit.
    pub fn forever() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    /// Poll at `poll_interval` for at most `timeout`.
    pub fn bounded(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout: Some(timeout),
        }
    }

    /// Returns true once `elapsed` has used up the budget.
    pub fn exhausted(&self, elapsed: Duration) -> bool {
        self.timeout.is_some_and(|max| elapsed >= max)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::bounded(Self::DEFAULT_POLL_INTERVAL, Self::DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_polls_every_ten_millis() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_millis(10));
        assert_eq!(policy.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn forever_is_explicit() {
        let forever = WaitPolicy::forever();
        assert!(!forever.exhausted(Duration::from_secs(86_400)));

        let spent = WaitPolicy::bounded(Duration::ZERO, Duration::ZERO);
        assert!(spent.exhausted(Duration::ZERO));
    }
}
