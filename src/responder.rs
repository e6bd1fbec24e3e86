use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
};
use tracing::warn;

use crate::{handler::RequestHandler, request::FakeRequest};

/// Full-override responder: bypasses the declarative [`Response`] entirely
/// and returns whatever it likes.
///
/// [`Response`]: crate::Response
pub type Responder =
    Arc<dyn Fn(&FakeRequest, &RequestHandler) -> axum::response::Response + Send + Sync>;

/// Writes a handler's declarative response.
///
/// Headers are applied first in insertion order, then the status code (a
/// zero status keeps the transport default), then the body. Invalid header
/// names, header values, and status codes were accepted as plain strings at
/// setup time, so they surface here as logged diagnostics rather than
/// failures.
pub(crate) fn respond(handler: &RequestHandler) -> axum::response::Response {
    let parts = handler.response().snapshot();
    let mut response = axum::response::Response::new(Body::empty());

    for (key, value) in &parts.headers {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(err) => {
                warn!(header = key.as_str(), "skipping invalid response header name: {err}");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(header = key.as_str(), "skipping invalid response header value: {err}");
                continue;
            }
        };
        response.headers_mut().append(name, value);
    }

    if parts.status != 0 {
        match StatusCode::from_u16(parts.status) {
            Ok(status) => *response.status_mut() = status,
            Err(err) => warn!(status = parts.status, "ignoring invalid response status: {err}"),
        }
    }

    if !parts.body.is_empty() {
        *response.body_mut() = Body::from(parts.body);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_headers_status_and_body() {
        let handler = RequestHandler::new(false);
        handler
            .get("/users")
            .reply(201)
            .set_header("Content-Type", "application/json")
            .add_header("X-Custom", "a")
            .add_header("X-Custom", "b")
            .body_string("[]");

        let response = respond(&handler);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        let custom: Vec<_> = response.headers().get_all("X-Custom").iter().collect();
        assert_eq!(custom, vec!["a", "b"]);
    }

    #[test]
    fn unset_status_keeps_transport_default() {
        let handler = RequestHandler::new(false);
        handler.get("/users");

        let response = respond(&handler);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn invalid_header_is_skipped_not_fatal() {
        let handler = RequestHandler::new(false);
        handler.get("/users").reply(200).set_header("bad name", "x");

        let response = respond(&handler);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().is_empty());
    }
}
