use crate::{FetchResult, MultiplexError, MultiplexResponse};

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport-neutral HTTP reply produced by the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn text(status: u16, message: impl AsRef<str>) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: format!("{}\n", message.as_ref()).into_bytes(),
        }
    }

    pub fn bad_request() -> Self {
        Self::text(400, "Bad Request")
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::text(405, "Method Not Allowed")
    }

    pub fn internal_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    /// Successful batch encoded as a `MultiplexResponse`.
    pub fn from_results(results: &[FetchResult]) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(&MultiplexResponse::from_results(results))?;
        Ok(Self {
            status: 200,
            content_type: JSON_CONTENT_TYPE,
            body,
        })
    }

    /// Externally visible rendering of a failed batch. Unclassified causes
    /// are never exposed; the caller logs them.
    pub fn from_error(err: &MultiplexError) -> Self {
        match err {
            MultiplexError::TooManyUrls { max } => {
                Self::text(400, format!("Validation: max number of urls is {max}"))
            }
            MultiplexError::SlowUrl { url } => Self::text(422, format!("URL {url} timed out")),
            MultiplexError::Unclassified { .. } => Self::internal_error(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
