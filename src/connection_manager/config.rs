//! Connection manager configuration.

use std::time::Duration;

use thiserror::Error;

/// Errors returned when validating a [`ConnectionManagerConfig`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// An explicit early-drop threshold would never let an idle connection
    /// be dropped before its timeout.
    #[error("early drop threshold {threshold:?} must be below the idle timeout {timeout:?}")]
    EarlyDropThreshold {
        /// Configured threshold.
        threshold: Duration,
        /// Configured idle timeout.
        timeout: Duration,
    },
}

/// Timeouts governing a [`ConnectionManager`](super::ConnectionManager).
///
/// A zero timeout disables idle timeouts and early dropping altogether.
///
/// ```
/// use std::time::Duration;
///
/// use wirechain::connection_manager::ConnectionManagerConfig;
///
/// let config = ConnectionManagerConfig::new(Duration::from_secs(60));
/// assert_eq!(config.early_drop_threshold(), Duration::from_secs(30));
///
/// let invalid = ConnectionManagerConfig::new(Duration::from_secs(60))
///     .with_early_drop_threshold(Duration::from_secs(60));
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionManagerConfig {
    timeout: Duration,
    early_drop_threshold: Option<Duration>,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self { Self::new(Duration::from_secs(60)) }
}

impl ConnectionManagerConfig {
    /// Configure an idle timeout with the default early-drop threshold of
    /// half the timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            early_drop_threshold: None,
        }
    }

    /// Override the idle time a connection must exceed before
    /// [`drop_idle_connections`](super::ConnectionManager::drop_idle_connections)
    /// may drop it.
    #[must_use]
    pub const fn with_early_drop_threshold(mut self, threshold: Duration) -> Self {
        self.early_drop_threshold = Some(threshold);
        self
    }

    /// Idle timeout armed for connections added with a timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration { self.timeout }

    /// Effective early-drop threshold.
    #[must_use]
    pub fn early_drop_threshold(&self) -> Duration {
        self.early_drop_threshold.unwrap_or(self.timeout / 2)
    }

    /// Threshold set through
    /// [`with_early_drop_threshold`](Self::with_early_drop_threshold), if any.
    #[must_use]
    pub const fn explicit_early_drop_threshold(&self) -> Option<Duration> { self.early_drop_threshold }

    /// Check the threshold against the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EarlyDropThreshold`] when an explicit threshold
    /// is not below a non-zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.early_drop_threshold {
            Some(threshold) if !self.timeout.is_zero() && threshold >= self.timeout => {
                Err(ConfigError::EarlyDropThreshold {
                    threshold,
                    timeout: self.timeout,
                })
            }
            _ => Ok(()),
        }
    }
}
