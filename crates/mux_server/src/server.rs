use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use mux_engine::{CancellationToken, Multiplexer};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::config::{ConfigError, ServerConfig};
use crate::handler::{handle, AppState};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// HTTP/1 server for `POST /multiplex` with a bounded number of live
/// connections.
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    connections: Arc<Semaphore>,
    grace: Duration,
}

impl Server {
    pub async fn bind(config: &ServerConfig, multiplexer: Multiplexer) -> Result<Self, ServeError> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            state: Arc::new(AppState {
                multiplexer,
                abort: CancellationToken::new(),
            }),
            connections: Arc::new(Semaphore::new(config.max_connections.max(1))),
            grace: config.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` fires or accepting fails. Open connections
    /// then get the grace period to finish before in-flight batches are
    /// cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServeError> {
        let tracker = TaskTracker::new();
        let result = self.accept_loop(&tracker, &shutdown).await;

        // Stop every connection, whether we are here by signal or by error.
        shutdown.cancel();
        tracker.close();
        if tokio::time::timeout(self.grace, tracker.wait()).await.is_err() {
            engine_warn!(
                "Shutdown grace of {:?} elapsed with {} connection(s) open; aborting",
                self.grace,
                tracker.len()
            );
            self.state.abort.cancel();
            tracker.wait().await;
        }
        engine_info!("Server stopped");
        result
    }

    async fn accept_loop(
        &self,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Result<(), ServeError> {
        loop {
            let Some(Ok(permit)) = shutdown
                .run_until_cancelled(self.connections.clone().acquire_owned())
                .await
            else {
                return Ok(());
            };
            let Some(accepted) = shutdown.run_until_cancelled(self.listener.accept()).await else {
                return Ok(());
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(err) if is_transient(&err) => {
                    engine_debug!("Transient accept error: {}", err);
                    continue;
                }
                Err(err) => return Err(ServeError::Accept(err)),
            };

            let state = self.state.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                let _permit = permit;
                let service = service_fn(move |req| handle(req, state.clone()));
                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(err) = result {
                    engine_debug!("Connection from {} ended with error: {}", peer, err);
                }
            });
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
