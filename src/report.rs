use std::sync::{Arc, Mutex};

use tracing::{error, info};

/// Reporting capability tied to the caller's test execution.
///
/// Stands in for the test framework: assertion failures and the
/// unused-handler audit are surfaced through `fail`, descriptive
/// progress lines through `log`. Supplied once at server start via
/// [`FakeServer::start_with_context`](crate::FakeServer::start_with_context).
pub trait TestContext: Send + Sync {
    fn log(&self, message: &str);
    fn fail(&self, message: &str);
}

/// A [`TestContext`] that records everything it is told.
///
/// Log lines and failures are kept in insertion order and also forwarded
/// to `tracing`, so tests can assert on diagnostics deterministically
/// while still seeing them in the captured test output.
#[derive(Clone, Default)]
pub struct RecordingContext {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Default)]
struct Recorded {
    logs: Vec<String>,
    failures: Vec<String>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line recorded through `log`, in order.
    pub fn logs(&self) -> Vec<String> {
        self.inner.lock().expect("context lock poisoned").logs.clone()
    }

    /// Every failure recorded through `fail`, in order.
    pub fn failures(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("context lock poisoned")
            .failures
            .clone()
    }
}

impl TestContext for RecordingContext {
    fn log(&self, message: &str) {
        info!("{message}");
        self.inner
            .lock()
            .expect("context lock poisoned")
            .logs
            .push(message.to_string());
    }

    fn fail(&self, message: &str) {
        error!("{message}");
        self.inner
            .lock()
            .expect("context lock poisoned")
            .failures
            .push(message.to_string());
    }
}
