//! Multiplexer core: pure batch types, error taxonomy and wire encoding.
mod error;
mod reply;
mod types;
mod wire;

pub use error::{ErrorKind, FailureKind, FetchError, MultiplexError};
pub use reply::{Reply, TEXT_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use types::{BatchResult, FetchResult, Headers};
pub use wire::{canonical_header_name, HttpResponseView, MultiplexRequest, MultiplexResponse};
