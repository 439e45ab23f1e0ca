//! Runtime control for [`PipelineServer`].

mod accept;
mod backoff;

use std::sync::Arc;

use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use bytes::Bytes;
use futures::Future;
use log::{info, warn};
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    Bound,
    PipelineServer,
    ServerError,
    manager_task::{self, ManagerOptions, run_manager},
};
use crate::{connection_manager::ConnectionManager, pipeline::PipelineFactory};

impl<F, W> PipelineServer<F, W, Bound>
where
    F: PipelineFactory<Bytes, W> + 'static,
    W: Send + 'static,
{
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the connection manager
    /// configuration is invalid.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the accept tasks stop, connections are drained
    /// gracefully and any still open after the drain timeout are dropped.
    /// Returns once every connection task has finished.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use bytes::Bytes;
    /// use tokio::sync::oneshot;
    /// use wirechain::{pipeline::Pipeline, server::PipelineServer, transport::Transport};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirechain::server::ServerError> {
    /// let server = PipelineServer::new(|transport: Arc<dyn Transport>| {
    ///     Pipeline::<Bytes>::with_transport(transport)
    /// })
    /// .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    ///
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Unbound servers cannot run:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    ///
    /// use bytes::Bytes;
    /// use wirechain::{pipeline::Pipeline, server::PipelineServer, transport::Transport};
    ///
    /// async fn try_run() {
    ///     PipelineServer::new(|transport: Arc<dyn Transport>| {
    ///         Pipeline::<Bytes>::with_transport(transport)
    ///     })
    ///     .run_with_shutdown(async {})
    ///     .await
    ///     .expect("unbound servers do not expose run_with_shutdown()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the connection manager
    /// configuration is invalid. Accept failures are retried with
    /// exponential back-off and do not surface as errors.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let PipelineServer {
            factory,
            workers,
            manager,
            max_connections,
            drain_grace,
            drain_timeout,
            backoff,
            ready_tx,
            state: Bound { listener },
            ..
        } = self;
        let manager = ConnectionManager::new(manager)?;

        let accept_token = CancellationToken::new();
        let drain_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (handle, commands) = manager_task::channel();
        let manager_task = tokio::spawn(run_manager(
            manager,
            commands,
            ManagerOptions {
                max_connections,
                drain_grace,
                drain_timeout,
            },
            drain_token.clone(),
        ));

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                Arc::clone(&factory),
                AcceptLoopOptions {
                    manager: handle.clone(),
                    shutdown: accept_token.clone(),
                    tracker: tracker.clone(),
                    backoff,
                },
            ));
        }
        drop(handle);

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("failed to send readiness signal: receiver dropped");
        }

        shutdown.await;
        info!("shutdown requested; no longer accepting connections");
        accept_token.cancel();
        drain_token.cancel();

        tracker.close();
        tracker.wait().await;
        if let Err(e) = manager_task.await {
            warn!("connection manager task failed: error={e}");
        }
        Ok(())
    }
}
