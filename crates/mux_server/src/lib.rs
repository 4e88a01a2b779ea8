//! HTTP boundary for the multiplexer: configuration, routing and lifecycle.
pub mod config;
pub mod handler;
pub mod server;
pub mod shutdown;

use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_error, engine_info};
use mux_engine::{CancellationToken, LogSink, Multiplexer, ReqwestFetcher};

pub use config::{ConfigError, ServerConfig};
pub use server::{ServeError, Server};

/// Builds the multiplexer from `config` and serves until a termination
/// signal arrives or the listener fails.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let fetcher = ReqwestFetcher::new(config.fetch_settings()).context("build http client")?;
    let multiplexer = Multiplexer::new(config.multiplex_config(Arc::new(fetcher), Arc::new(LogSink)));
    engine_info!("Multiplexer ready: {:?}", multiplexer.config());

    let server = Server::bind(&config, multiplexer).await?;
    engine_info!("Listening on {}", server.local_addr()?);

    let shutdown = CancellationToken::new();
    let mut serving = tokio::spawn(server.serve(shutdown.clone()));
    tokio::select! {
        signal = shutdown::wait_for_signal() => {
            engine_info!("Service got signal {}", signal);
            shutdown.cancel();
            serving.await.context("server task")??;
        }
        joined = &mut serving => {
            let result = joined.context("server task")?;
            if let Err(err) = &result {
                engine_error!("Service got fatal error: {}", err);
            }
            result?;
        }
    }
    Ok(())
}
