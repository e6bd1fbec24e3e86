use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::Method;
use serde_json::Value;

use crate::{
    assertions::{
        Assertor, RequiredBody, RequiredHeaderValue, RequiredHeaders, RequiredJsonSubset,
        RequiredQueries, RequiredQueryValue,
    },
    report::TestContext,
    request::{FakeRequest, decode_component, split_path_and_query},
    responder::Responder,
    response::Response,
};

/// A registered request handler: a method+path(+query) matcher paired with
/// the response to write and the assertions to run.
///
/// `RequestHandler` is a shared handle — the copy returned by
/// [`FakeServer::register_handler`](crate::FakeServer::register_handler)
/// and the one the dispatcher selects are the same underlying record, so
/// every chained configuration call is visible once traffic arrives.
#[derive(Clone)]
pub struct RequestHandler {
    config: Arc<Mutex<HandlerConfig>>,
    response: Response,
    called: Arc<Mutex<u64>>,
}

#[derive(Default)]
struct HandlerConfig {
    method: String,
    path: Option<String>,
    raw_query: Option<String>,
    responder: Option<Responder>,
    assertions: Vec<Arc<dyn Assertor>>,
    reporting_enabled: bool,
}

impl RequestHandler {
    pub(crate) fn new(reporting_enabled: bool) -> Self {
        Self {
            config: Arc::new(Mutex::new(HandlerConfig {
                reporting_enabled,
                ..HandlerConfig::default()
            })),
            response: Response::new(),
            called: Arc::new(Mutex::new(0)),
        }
    }

    pub fn get(&self, path: &str) -> &Self {
        self.method_path("GET", path)
    }

    pub fn post(&self, path: &str) -> &Self {
        self.method_path("POST", path)
    }

    pub fn put(&self, path: &str) -> &Self {
        self.method_path("PUT", path)
    }

    pub fn patch(&self, path: &str) -> &Self {
        self.method_path("PATCH", path)
    }

    pub fn delete(&self, path: &str) -> &Self {
        self.method_path("DELETE", path)
    }

    pub fn head(&self, path: &str) -> &Self {
        self.method_path("HEAD", path)
    }

    fn method_path(&self, method: &str, path_and_query: &str) -> &Self {
        let (path, raw_query) = split_path_and_query(path_and_query);
        let mut config = self.lock();
        config.method = method.to_ascii_uppercase();
        // Registering "/" leaves the path matcher unset, which makes this
        // handler a permissive fallback for any path (see DESIGN.md).
        if path != "/" {
            config.path = Some(path.to_string());
        }
        config.raw_query = raw_query.map(str::to_string);
        self
    }

    /// Sets the response status and returns the [`Response`] handle for
    /// further chaining.
    pub fn reply(&self, status: u16) -> Response {
        self.response.status(status);
        self.response.clone()
    }

    /// The handler's [`Response`], for configuration outside a `reply`
    /// chain or for inspection from a custom responder.
    pub fn response(&self) -> Response {
        self.response.clone()
    }

    /// Installs a full-override responder. When set, the declarative
    /// [`Response`] is ignored entirely for this handler.
    pub fn handle<F>(&self, responder: F) -> &Self
    where
        F: Fn(&FakeRequest, &RequestHandler) -> axum::response::Response + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
        self
    }

    /// Requires the listed header keys on every request to this handler.
    pub fn assert_headers(&self, keys: &[&str]) -> &Self {
        self.push_assertion(Arc::new(RequiredHeaders::new(keys)))
    }

    /// Requires the named header to carry exactly `value`.
    pub fn assert_header_value(&self, key: &str, value: &str) -> &Self {
        self.push_assertion(Arc::new(RequiredHeaderValue::new(key, value)))
    }

    /// Requires the listed query parameters on every request to this handler.
    pub fn assert_queries(&self, keys: &[&str]) -> &Self {
        self.push_assertion(Arc::new(RequiredQueries::new(keys)))
    }

    /// Requires the named query parameter to carry exactly `value`.
    pub fn assert_query_value(&self, key: &str, value: &str) -> &Self {
        self.push_assertion(Arc::new(RequiredQueryValue::new(key, value)))
    }

    /// Requires the request body to equal `body` (ASCII case folded).
    pub fn assert_body(&self, body: &[u8]) -> &Self {
        self.push_assertion(Arc::new(RequiredBody::new(body)))
    }

    /// Requires every leaf of `reference` to appear, deep-equal, in the
    /// request's JSON body.
    pub fn assert_json_subset(&self, reference: &Value) -> &Self {
        self.push_assertion(Arc::new(RequiredJsonSubset::new(reference)))
    }

    /// Runs the provided assertor against requests to this handler.
    pub fn assert_custom(&self, assertor: impl Assertor + 'static) -> &Self {
        self.push_assertion(Arc::new(assertor))
    }

    /// How many times this handler has been selected by the dispatcher.
    pub fn call_count(&self) -> u64 {
        *self.called.lock().expect("call count lock poisoned")
    }

    fn push_assertion(&self, assertor: Arc<dyn Assertor>) -> &Self {
        let mut config = self.lock();
        if !config.reporting_enabled {
            panic!(
                "handler declares assertions but the server was started without a test \
                 context; use FakeServer::start_with_context"
            );
        }
        config.assertions.push(assertor);
        self
    }

    pub(crate) fn record_call(&self) {
        *self.called.lock().expect("call count lock poisoned") += 1;
    }

    pub(crate) fn method_matches(&self, method: &Method) -> bool {
        self.lock().method == method.as_str()
    }

    /// Full-matcher equality: path and raw query both equal the inbound
    /// ones, percent-decoded. A handler with an unset path matcher has no
    /// full matcher and never matches exactly.
    pub(crate) fn exact_match(&self, path: &str, raw_query: Option<&str>) -> bool {
        let config = self.lock();
        let Some(registered) = config.path.as_deref() else {
            return false;
        };
        decode_component(registered) == decode_component(path)
            && decoded_query(config.raw_query.as_deref()) == decoded_query(raw_query)
    }

    /// Path-only equality, ignoring queries on both sides. An unset path
    /// matcher is permissive here: it matches any inbound path.
    pub(crate) fn path_matches(&self, path: &str) -> bool {
        match self.lock().path.as_deref() {
            Some(registered) => decode_component(registered) == decode_component(path),
            None => true,
        }
    }

    pub(crate) fn has_assertions(&self) -> bool {
        !self.lock().assertions.is_empty()
    }

    /// Logs each assertor's intent, evaluates it, and reports failures
    /// without short-circuiting: one failing assertion never skips the
    /// rest, nor the response write that follows.
    pub(crate) fn run_assertions(&self, context: &dyn TestContext, request: &FakeRequest) {
        let assertions = self.lock().assertions.clone();
        for assertor in assertions {
            context.log(&assertor.describe_intent());
            if let Err(error) = assertor.assert(request) {
                assertor.report_failure(context, &error);
            }
        }
    }

    pub(crate) fn responder(&self) -> Option<Responder> {
        self.lock().responder.clone()
    }

    /// `METHOD path` rendering used by diagnostics and the close audit.
    pub(crate) fn describe(&self) -> String {
        let config = self.lock();
        let path = config.path.as_deref().unwrap_or("/");
        match config.raw_query.as_deref() {
            Some(query) => format!("{} {}?{}", config.method, path, query),
            None => format!("{} {}", config.method, path),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandlerConfig> {
        self.config.lock().expect("handler lock poisoned")
    }
}

/// An absent query and an empty one compare equal.
fn decoded_query(raw_query: Option<&str>) -> String {
    raw_query.map(decode_component).unwrap_or_default()
}
