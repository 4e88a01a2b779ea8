use engine_logging::engine_warn;

/// Resolves with the name of the first termination signal received.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                engine_warn!("Cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        engine_warn!("Cannot listen for SIGINT: {}", err);
        std::future::pending::<()>().await;
    }
}
