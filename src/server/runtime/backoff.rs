//! Back-off configuration for the server accept loop.

use std::time::Duration;

const MIN_DELAY: Duration = Duration::from_millis(1);

/// Configuration for exponential back-off timing in the accept loop.
///
/// Failed `accept()` calls are retried after `initial_delay`, doubling on each
/// consecutive failure up to `max_delay`. A successful accept resets the
/// delay. Defaults to 10 ms, capped at 1 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp both delays to at least one millisecond and swap them if
    /// `initial_delay` exceeds `max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use wirechain::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let initial = self.initial_delay.max(MIN_DELAY);
        let max = self.max_delay.max(MIN_DELAY);
        Self {
            initial_delay: initial.min(max),
            max_delay: initial.max(max),
        }
    }

    /// Delay to wait after a failure that followed a wait of `previous`.
    #[must_use]
    pub fn next_delay(&self, previous: Duration) -> Duration { (previous * 2).min(self.max_delay) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10, 1000, 10, 1000)]
    #[case(0, 0, 1, 1)]
    #[case(500, 20, 20, 500)]
    fn normalization(#[case] initial: u64, #[case] max: u64, #[case] want_initial: u64, #[case] want_max: u64) {
        let cfg = BackoffConfig {
            initial_delay: Duration::from_millis(initial),
            max_delay: Duration::from_millis(max),
        }
        .normalized();
        assert_eq!(cfg.initial_delay, Duration::from_millis(want_initial));
        assert_eq!(cfg.max_delay, Duration::from_millis(want_max));
    }

    #[rstest]
    fn delay_doubles_up_to_the_cap() {
        let cfg = BackoffConfig::default();
        let delays: Vec<_> = std::iter::successors(Some(cfg.initial_delay), |d| Some(cfg.next_delay(*d)))
            .take(9)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, [10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }
}
