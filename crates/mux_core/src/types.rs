use std::collections::BTreeMap;

/// Response headers keyed by name, each with its values in arrival order.
pub type Headers = BTreeMap<String, Vec<String>>;

/// One completed GET, stored at the index of the URL that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchResult {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl FetchResult {
    pub fn new(status_code: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers,
            body: body.into(),
        }
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Results in input order: `batch[i]` always answers `urls[i]`.
pub type BatchResult = Vec<FetchResult>;
