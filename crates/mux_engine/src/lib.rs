//! Multiplexer engine: bounded, fail-fast fan-out of HTTP GETs.
mod diagnostics;
mod fetch;
mod limiter;
mod multiplexer;
mod timeout;

pub use diagnostics::{DiagnosticEvent, DiagnosticsSink, LogSink, NullSink};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use limiter::{Admission, ConcurrencyLimiter};
pub use multiplexer::{
    MultiplexConfig, Multiplexer, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_URLS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use timeout::{CancelReason, TimeoutGuard};

pub use mux_core::{
    BatchResult, ErrorKind, FailureKind, FetchError, FetchResult, Headers, MultiplexError,
};
pub use tokio_util::sync::CancellationToken;
