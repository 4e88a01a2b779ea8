use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use mux_core::{BatchResult, FailureKind, FetchError, FetchResult, MultiplexError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, LogSink};
use crate::fetch::Fetcher;
use crate::limiter::ConcurrencyLimiter;
use crate::timeout::{CancelReason, TimeoutGuard};

pub const DEFAULT_MAX_URLS: usize = 20;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Fixed for the lifetime of a [`Multiplexer`].
#[derive(Clone)]
pub struct MultiplexConfig {
    pub max_urls: usize,
    pub max_concurrent: usize,
    pub per_request_timeout: Duration,
    pub fetcher: Arc<dyn Fetcher>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

impl MultiplexConfig {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            max_urls: DEFAULT_MAX_URLS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            per_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetcher,
            diagnostics: Arc::new(LogSink),
        }
    }

    pub fn with_max_urls(mut self, max_urls: usize) -> Self {
        self.max_urls = max_urls;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.per_request_timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl std::fmt::Debug for MultiplexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexConfig")
            .field("max_urls", &self.max_urls)
            .field("max_concurrent", &self.max_concurrent)
            .field("per_request_timeout", &self.per_request_timeout)
            .finish_non_exhaustive()
    }
}

/// Fans a batch of URLs out to the configured [`Fetcher`].
///
/// At most `max_concurrent` fetches of one batch run at a time, each bounded
/// by `per_request_timeout`. The first failure cancels every sibling and is
/// the only error reported; results are only returned when every fetch
/// succeeded, in input order.
#[derive(Debug, Clone)]
pub struct Multiplexer {
    config: MultiplexConfig,
}

impl Multiplexer {
    pub fn new(config: MultiplexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MultiplexConfig {
        &self.config
    }

    pub async fn multiplex(
        &self,
        urls: &[String],
        parent: &CancellationToken,
    ) -> Result<BatchResult, MultiplexError> {
        let config = &self.config;
        if urls.len() > config.max_urls {
            config.diagnostics.emit(DiagnosticEvent::BatchRejected {
                urls: urls.len(),
                max: config.max_urls,
            });
            return Err(MultiplexError::TooManyUrls {
                max: config.max_urls,
            });
        }
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        config
            .diagnostics
            .emit(DiagnosticEvent::BatchStarted { urls: urls.len() });

        let batch = parent.child_token();
        // Aborts stragglers if this future is dropped mid-batch.
        let _cancel_on_exit = batch.clone().drop_guard();
        let limiter = ConcurrencyLimiter::new(config.max_concurrent);
        let failure = Arc::new(FirstFailure::default());

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let job = FetchJob {
                index,
                url: url.clone(),
                timeout: config.per_request_timeout,
                fetcher: config.fetcher.clone(),
                diagnostics: config.diagnostics.clone(),
                limiter: limiter.clone(),
                batch: batch.clone(),
                failure: failure.clone(),
            };
            tasks.spawn(job.run());
        }

        let mut slots: Vec<Option<FetchResult>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((index, result))) => slots[index] = Some(result),
                Ok(None) => {}
                Err(err) => {
                    failure.record(MultiplexError::Unclassified {
                        url: None,
                        cause: FetchError::new(FailureKind::Internal, err.to_string()),
                    });
                    batch.cancel();
                }
            }
        }

        let outcome = match failure.get() {
            Some(err) => Err(err),
            None => slots
                .into_iter()
                .collect::<Option<BatchResult>>()
                .ok_or_else(|| MultiplexError::Unclassified {
                    url: None,
                    cause: FetchError::cancelled(),
                }),
        };

        config.diagnostics.emit(DiagnosticEvent::BatchFinished {
            urls: urls.len(),
            elapsed: started.elapsed(),
            error: outcome.as_ref().err().map(ToString::to_string),
        });
        outcome
    }
}

/// Single-write cell: only the first recorded failure is kept.
#[derive(Debug, Default)]
struct FirstFailure {
    cell: OnceLock<MultiplexError>,
}

impl FirstFailure {
    fn record(&self, err: MultiplexError) -> bool {
        self.cell.set(err).is_ok()
    }

    fn get(&self) -> Option<MultiplexError> {
        self.cell.get().cloned()
    }
}

struct FetchJob {
    index: usize,
    url: String,
    timeout: Duration,
    fetcher: Arc<dyn Fetcher>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    limiter: ConcurrencyLimiter,
    batch: CancellationToken,
    failure: Arc<FirstFailure>,
}

impl FetchJob {
    /// Returns the slot to fill, or `None` when the job failed or was cancelled.
    async fn run(self) -> Option<(usize, FetchResult)> {
        let _admission = self.limiter.admit(&self.batch).await?;
        if self.batch.is_cancelled() {
            return None;
        }
        self.diagnostics.emit(DiagnosticEvent::FetchAdmitted {
            index: self.index,
            url: self.url.clone(),
        });

        let started = Instant::now();
        let guard = TimeoutGuard::new(&self.batch, &self.url, self.timeout);
        let error = match guard.run(self.fetcher.fetch(&self.url, guard.token())).await {
            Ok(Ok(result)) => {
                self.diagnostics.emit(DiagnosticEvent::FetchCompleted {
                    index: self.index,
                    url: self.url.clone(),
                    status: result.status_code,
                    elapsed: started.elapsed(),
                });
                return Some((self.index, result));
            }
            Ok(Err(err)) if err.kind == FailureKind::Cancelled && self.batch.is_cancelled() => {
                return None;
            }
            Ok(Err(cause)) => MultiplexError::Unclassified {
                url: Some(self.url.clone()),
                cause,
            },
            Err(CancelReason::Parent) => return None,
            Err(CancelReason::Deadline { url }) => MultiplexError::SlowUrl { url },
        };

        self.diagnostics.emit(DiagnosticEvent::FetchFailed {
            index: self.index,
            url: self.url.clone(),
            error: error.to_string(),
        });
        if self.failure.record(error) {
            self.batch.cancel();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let cell = FirstFailure::default();
        assert!(cell.record(MultiplexError::SlowUrl { url: "a".into() }));
        assert!(!cell.record(MultiplexError::SlowUrl { url: "b".into() }));
        assert_eq!(cell.get(), Some(MultiplexError::SlowUrl { url: "a".into() }));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(crate::ReqwestFetcher::with_client(
            reqwest::Client::new(),
        ));
        let config = MultiplexConfig::new(fetcher);
        assert_eq!(config.max_urls, DEFAULT_MAX_URLS);
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.per_request_timeout, DEFAULT_REQUEST_TIMEOUT);

        let config = config
            .with_max_urls(5)
            .with_max_concurrent(2)
            .with_request_timeout(Duration::from_millis(10));
        assert_eq!(config.max_urls, 5);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.per_request_timeout, Duration::from_millis(10));
    }
}
