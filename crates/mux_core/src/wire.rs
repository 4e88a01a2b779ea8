//! JSON bodies exchanged on `POST /multiplex`.
//!
//! Raw response bodies travel as standard base64 strings and header names are
//! sent in canonical MIME form (`content-type` becomes `Content-Type`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{FetchResult, Headers};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiplexRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiplexResponse {
    pub http_responses: Vec<HttpResponseView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseView {
    pub status_code: u16,
    pub headers: Headers,
    #[serde(serialize_with = "encode_body", deserialize_with = "decode_body")]
    pub body: Vec<u8>,
}

impl From<&FetchResult> for HttpResponseView {
    fn from(result: &FetchResult) -> Self {
        let mut headers = Headers::new();
        for (name, values) in &result.headers {
            headers
                .entry(canonical_header_name(name))
                .or_default()
                .extend(values.iter().cloned());
        }
        Self {
            status_code: result.status_code,
            headers,
            body: result.body.clone(),
        }
    }
}

impl MultiplexResponse {
    pub fn from_results(results: &[FetchResult]) -> Self {
        Self {
            http_responses: results.iter().map(HttpResponseView::from).collect(),
        }
    }
}

/// Upper-cases the first letter and every letter following a hyphen,
/// lower-cases the rest. Names containing spaces or non-token bytes are
/// returned unchanged.
pub fn canonical_header_name(name: &str) -> String {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

fn encode_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn decode_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = Option::<String>::deserialize(deserializer)?;
    match encoded {
        Some(text) => STANDARD.decode(text).map_err(serde::de::Error::custom),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_header_name;

    #[test]
    fn canonicalises_common_names() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("X-REQUEST-ID"), "X-Request-Id");
        assert_eq!(canonical_header_name("date"), "Date");
    }

    #[test]
    fn leaves_invalid_names_alone() {
        assert_eq!(canonical_header_name("bad name"), "bad name");
        assert_eq!(canonical_header_name(""), "");
    }
}
