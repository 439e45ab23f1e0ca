//! Builder methods for [`PipelineServer`].

use core::marker::PhantomData;
use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::sync::oneshot;

use super::{BackoffConfig, PipelineServer, ServerState, Unbound};
use crate::{connection_manager::ConnectionManagerConfig, pipeline::PipelineFactory};

pub mod binding;

/// Grace period granted to busy connections before they are told to close.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);
/// Time allowed for a graceful drain before remaining connections are dropped.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

impl<F, W> PipelineServer<F, W>
where
    F: PipelineFactory<Bytes, W> + 'static,
{
    /// Create a new `PipelineServer` from the given pipeline factory.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). Connections time out after 60 seconds
    /// of inactivity. Call [`bind`](Self::bind) before running the server.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use bytes::Bytes;
    /// use wirechain::{pipeline::Pipeline, server::PipelineServer, transport::Transport};
    ///
    /// let server = PipelineServer::new(|transport: Arc<dyn Transport>| {
    ///     Pipeline::<Bytes>::with_transport(transport)
    /// })
    /// .workers(2);
    /// assert_eq!(server.worker_count(), 2);
    /// ```
    #[must_use]
    pub fn new(factory: F) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            factory: Arc::new(factory),
            workers,
            manager: ConnectionManagerConfig::default(),
            max_connections: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            backoff: BackoffConfig::default(),
            ready_tx: None,
            state: Unbound,
            _pipeline: PhantomData,
        }
    }
}

impl<F, W, S> PipelineServer<F, W, S>
where
    F: PipelineFactory<Bytes, W> + 'static,
    S: ServerState,
{
    /// Set the number of accept tasks to spawn for the server.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Set how long a connection may sit idle before it is closed.
    ///
    /// A zero duration disables idle timeouts and early dropping. Any early
    /// drop threshold set previously is kept.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        let threshold = self.manager.explicit_early_drop_threshold();
        self.manager = ConnectionManagerConfig::new(timeout);
        if let Some(threshold) = threshold {
            self.manager = self.manager.with_early_drop_threshold(threshold);
        }
        self
    }

    /// Set the idle time a connection must exceed before it may be shed to
    /// make room for new ones. Checked against the idle timeout when the
    /// server starts.
    #[must_use]
    pub fn early_drop_threshold(mut self, threshold: Duration) -> Self {
        self.manager = self.manager.with_early_drop_threshold(threshold);
        self
    }

    /// Shed idle connections once more than `max` are open.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set how long connections are warned of a shutdown before idle ones
    /// are closed. Zero closes idle connections immediately.
    #[must_use]
    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Set how long a graceful drain may run before every remaining
    /// connection is dropped.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Configure exponential back-off for failed `accept()` calls.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Returns the configured number of accept tasks.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Connection manager configuration used when the server runs.
    #[must_use]
    pub const fn connection_manager_config(&self) -> &ConnectionManagerConfig { &self.manager }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::server::test_util::{EchoFactory, echo_factory};

    #[rstest]
    fn defaults(echo_factory: EchoFactory) {
        let server = PipelineServer::new(echo_factory);
        assert!(server.worker_count() >= 1);
        assert_eq!(
            server.connection_manager_config().timeout(),
            Duration::from_secs(60)
        );
        assert_eq!(server.drain_grace, DEFAULT_DRAIN_GRACE);
        assert_eq!(server.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
        assert!(server.max_connections.is_none());
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(4, 4)]
    fn worker_count_is_at_least_one(echo_factory: EchoFactory, #[case] requested: usize, #[case] expected: usize) {
        let server = PipelineServer::new(echo_factory).workers(requested);
        assert_eq!(server.worker_count(), expected);
    }

    #[rstest]
    fn idle_timeout_keeps_an_explicit_threshold(echo_factory: EchoFactory) {
        let server = PipelineServer::new(echo_factory)
            .early_drop_threshold(Duration::from_secs(2))
            .idle_timeout(Duration::from_secs(10));
        let config = server.connection_manager_config();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.early_drop_threshold(), Duration::from_secs(2));
    }

    #[rstest]
    fn accept_backoff_is_normalized(echo_factory: EchoFactory) {
        let server = PipelineServer::new(echo_factory).accept_backoff(BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5),
        });
        assert_eq!(server.backoff.initial_delay, Duration::from_millis(5));
        assert_eq!(server.backoff.max_delay, Duration::from_millis(50));
    }
}
