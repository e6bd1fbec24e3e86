use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::error;

/// Mutable description of what a handler sends back.
///
/// `Response` is a shared handle: the copy returned by
/// [`RequestHandler::reply`](crate::RequestHandler::reply) and the one the
/// dispatcher reads are the same underlying record, so configuration after
/// registration is still visible when traffic arrives. A status of `0`
/// means "unset" and leaves the transport default (200) in place.
#[derive(Clone, Default)]
pub struct Response {
    inner: Arc<Mutex<ResponseParts>>,
}

#[derive(Clone, Default)]
pub(crate) struct ResponseParts {
    pub(crate) status: u16,
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, status: u16) -> &Self {
        self.lock().status = status;
        self
    }

    /// Sets the header, replacing any existing values for the key.
    pub fn set_header(&self, key: &str, value: &str) -> &Self {
        let mut parts = self.lock();
        parts
            .headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(key));
        parts.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Appends a header value, keeping any existing values for the key.
    pub fn add_header(&self, key: &str, value: &str) -> &Self {
        self.lock()
            .headers
            .push((key.to_string(), value.to_string()));
        self
    }

    /// Replaces the response body with the given text.
    pub fn body_string(&self, body: &str) -> &Self {
        self.lock().body = body.as_bytes().to_vec();
        self
    }

    /// Serializes `value` as JSON and replaces the response body with it.
    ///
    /// Encoding happens at setup time, before any request can arrive, so a
    /// failure is logged and the body left empty instead of aborting.
    pub fn body_struct<T: Serialize>(&self, value: &T) -> &Self {
        let mut parts = self.lock();
        match serde_json::to_vec(value) {
            Ok(encoded) => parts.body = encoded,
            Err(err) => {
                parts.body.clear();
                error!("failed to encode response body struct: {err}");
            }
        }
        self
    }

    pub(crate) fn snapshot(&self) -> ResponseParts {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResponseParts> {
        self.inner.lock().expect("response lock poisoned")
    }
}
