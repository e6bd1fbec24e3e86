use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, Method, request::Parts},
};
use percent_encoding::percent_decode_str;
use tracing::warn;

/// Captured view of one inbound request.
///
/// The dispatcher buffers the body up front, so assertors and custom
/// responders all read from the same immutable snapshot; nothing is
/// consumed. The body is `None` only for hand-built requests (e.g. when
/// unit-testing a custom assertor) — the server always captures one,
/// possibly empty.
#[derive(Debug, Clone)]
pub struct FakeRequest {
    method: Method,
    path: String,
    raw_query: Option<String>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl FakeRequest {
    /// Builds a request from a method and a `path?query` string, for
    /// exercising assertors without a live server.
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, raw_query) = split_path_and_query(path_and_query);
        Self {
            method,
            path: path.to_string(),
            raw_query: raw_query.map(str::to_string),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(name, value, "skipping invalid header on test request"),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub(crate) fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            raw_query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body: Some(body),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path as received, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`, if any.
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value for the named header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// First value for the named query parameter, form-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// All query parameters in order, form-decoded (`+` as space).
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.raw_query.as_deref().map(parse_query).unwrap_or_default()
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

pub(crate) fn split_path_and_query(path_and_query: &str) -> (&str, Option<&str>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    }
}

/// Percent-decodes a path or raw query component for comparison.
pub(crate) fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

fn decode_form_component(component: &str) -> String {
    decode_component(&component.replace('+', " "))
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_form_component(key), decode_form_component(value)),
            None => (decode_form_component(pair), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_query() {
        assert_eq!(split_path_and_query("/users"), ("/users", None));
        assert_eq!(
            split_path_and_query("/users?movie=dreamers"),
            ("/users", Some("movie=dreamers"))
        );
        assert_eq!(split_path_and_query("/?a=1"), ("/", Some("a=1")));
    }

    #[test]
    fn query_lookup_is_form_decoded() {
        let request = FakeRequest::new(Method::GET, "/users?name=Tim+Burton&tag=a%2Fb");
        assert_eq!(request.query("name").as_deref(), Some("Tim Burton"));
        assert_eq!(request.query("tag").as_deref(), Some("a/b"));
        assert_eq!(request.query("missing"), None);
    }

    #[test]
    fn query_pairs_keep_order_and_valueless_keys() {
        let request = FakeRequest::new(Method::GET, "/search?b=2&a=1&flag");
        assert_eq!(
            request.query_pairs(),
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn decode_component_leaves_plus_alone() {
        assert_eq!(decode_component("/user/+799%20x"), "/user/+799 x");
    }

    #[test]
    fn body_is_absent_until_set() {
        let request = FakeRequest::new(Method::POST, "/users");
        assert!(request.body().is_none());
        let request = request.with_body("hello");
        assert_eq!(request.body(), Some(&b"hello"[..]));
    }
}
