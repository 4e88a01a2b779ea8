use std::fmt;

/// Why a single fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Network,
    Timeout,
    Body,
    Cancelled,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Body => write!(f, "failed to read response body"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Internal => write!(f, "internal error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "operation cancelled")
    }
}

/// The exhaustive outcomes of a failed multiplex call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultiplexError {
    /// The batch exceeded the configured ceiling; nothing was fetched.
    #[error("too many urls: at most {max} allowed")]
    TooManyUrls { max: usize },
    /// The named URL did not answer within the per-request timeout.
    #[error("url {url} failed to process the request within the specified timeout")]
    SlowUrl { url: String },
    /// Any other failure. `url` is absent when no single fetch is to blame.
    #[error("multiplex failed: {cause}")]
    Unclassified {
        url: Option<String>,
        #[source]
        cause: FetchError,
    },
}

/// Fieldless discriminant of [`MultiplexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TooManyUrls,
    SlowUrl,
    Unclassified,
}

impl MultiplexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultiplexError::TooManyUrls { .. } => ErrorKind::TooManyUrls,
            MultiplexError::SlowUrl { .. } => ErrorKind::SlowUrl,
            MultiplexError::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }

    /// The URL this error is attributed to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            MultiplexError::TooManyUrls { .. } => None,
            MultiplexError::SlowUrl { url } => Some(url),
            MultiplexError::Unclassified { url, .. } => url.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn kind_discriminates_without_message_text() {
        let slow = MultiplexError::SlowUrl {
            url: "http://a".into(),
        };
        let other = MultiplexError::Unclassified {
            url: None,
            cause: FetchError::cancelled(),
        };
        assert_eq!(slow.kind(), ErrorKind::SlowUrl);
        assert_eq!(other.kind(), ErrorKind::Unclassified);
        assert_eq!(MultiplexError::TooManyUrls { max: 3 }.kind(), ErrorKind::TooManyUrls);
        assert_eq!(slow.url(), Some("http://a"));
        assert_eq!(other.url(), None);
    }

    #[test]
    fn unclassified_exposes_cause_as_source() {
        let err = MultiplexError::Unclassified {
            url: Some("http://b".into()),
            cause: FetchError::new(FailureKind::Network, "connection refused"),
        };
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "network error: connection refused");
    }
}
