use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    BatchRejected {
        urls: usize,
        max: usize,
    },
    BatchStarted {
        urls: usize,
    },
    FetchAdmitted {
        index: usize,
        url: String,
    },
    FetchCompleted {
        index: usize,
        url: String,
        status: u16,
        elapsed: Duration,
    },
    FetchFailed {
        index: usize,
        url: String,
        error: String,
    },
    BatchFinished {
        urls: usize,
        elapsed: Duration,
        error: Option<String>,
    },
}

/// Receiver for multiplexer diagnostics, injected at construction.
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Forwards events to the global `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn emit(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::BatchRejected { urls, max } => {
                engine_info!("Batch rejected urls={} max={}", urls, max);
            }
            DiagnosticEvent::BatchStarted { urls } => {
                engine_debug!("Batch started urls={}", urls);
            }
            DiagnosticEvent::FetchAdmitted { index, url } => {
                engine_debug!("Fetch admitted index={} url={}", index, url);
            }
            DiagnosticEvent::FetchCompleted {
                index,
                url,
                status,
                elapsed,
            } => {
                engine_debug!(
                    "Fetch completed index={} status={} elapsed_ms={} url={}",
                    index,
                    status,
                    elapsed.as_millis(),
                    url
                );
            }
            DiagnosticEvent::FetchFailed { index, url, error } => {
                engine_warn!("Fetch failed index={} url={}: {}", index, url, error);
            }
            DiagnosticEvent::BatchFinished {
                urls,
                elapsed,
                error,
            } => match error {
                None => engine_info!(
                    "Batch finished urls={} elapsed_ms={}",
                    urls,
                    elapsed.as_millis()
                ),
                Some(error) => engine_info!(
                    "Batch failed urls={} elapsed_ms={}: {}",
                    urls,
                    elapsed.as_millis(),
                    error
                ),
            },
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn emit(&self, _event: DiagnosticEvent) {}
}
