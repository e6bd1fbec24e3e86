use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Request, State},
    http::uri::PathAndQuery,
    response::IntoResponse,
};
use tokio::{
    net::TcpListener,
    sync::oneshot,
    task::{self, JoinHandle},
};
use tracing::{error, info, warn};

use crate::{
    error::DispatchError,
    handler::RequestHandler,
    report::TestContext,
    request::FakeRequest,
    responder::respond,
};

/// The fake server: an HTTP listener on an ephemeral local port that
/// dispatches every inbound request against the registered handlers.
///
/// Handlers are matched in two passes: an exact method+path+query match
/// wins outright; otherwise a path-only match is used, but only when it is
/// unambiguous (exactly one candidate). Anything else is a 404.
pub struct FakeServer {
    state: ServerState,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub(crate) struct ServerState {
    handlers: Arc<RwLock<Vec<RequestHandler>>>,
    context: Option<Arc<dyn TestContext>>,
}

impl FakeServer {
    /// Starts a fake server with no reporting capability. Registering
    /// assertions on its handlers is a fatal setup error; use
    /// [`start_with_context`](Self::start_with_context) for that.
    pub async fn start() -> Result<Self> {
        Self::start_inner(None).await
    }

    /// Starts a fake server wired to the given reporting capability.
    /// Assertion failures, dispatch diagnostics, and the close-time
    /// unused-handler audit all go through `context`.
    pub async fn start_with_context(context: impl TestContext + 'static) -> Result<Self> {
        Self::start_inner(Some(Arc::new(context))).await
    }

    async fn start_inner(context: Option<Arc<dyn TestContext>>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind fake server listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read fake server address")?;

        let state = ServerState {
            handlers: Arc::new(RwLock::new(Vec::new())),
            context,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let server = axum::serve(listener, router(state.clone())).with_graceful_shutdown(
            async move {
                let _ = shutdown_rx.await;
            },
        );

        let task = task::spawn(async move {
            if let Err(err) = server.await {
                error!("fake server error: {err}");
            }
        });

        Ok(Self {
            state,
            base_url: format!("http://{addr}"),
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves the full URL to the fake server for a given path. The path
    /// should already be formatted (use `format!` for substitutions).
    pub fn resolve_url(&self, path: &str) -> String {
        if path.parse::<PathAndQuery>().is_err() {
            warn!(path, "resolve_url called with an invalid path");
        }
        format!("{}{path}", self.base_url)
    }

    /// Creates a new, empty handler, appends it to the dispatch table, and
    /// returns it for chained configuration.
    pub fn register_handler(&self) -> RequestHandler {
        let handler = RequestHandler::new(self.state.context.is_some());
        self.state
            .handlers
            .write()
            .expect("handler list lock poisoned")
            .push(handler.clone());
        handler
    }

    /// Wipes every registered handler. Chainable.
    pub fn reset(&self) -> &Self {
        self.state
            .handlers
            .write()
            .expect("handler list lock poisoned")
            .clear();
        self
    }

    /// Shuts the listener down, waiting for in-flight requests to finish,
    /// then audits the handler table: with a test context present, every
    /// handler that was never called is reported as a failure.
    pub async fn close(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        (&mut self.task)
            .await
            .context("fake server task failed during shutdown")?;

        if let Some(context) = &self.state.context {
            let handlers = self
                .state
                .handlers
                .read()
                .expect("handler list lock poisoned");
            for handler in handlers.iter() {
                if handler.call_count() == 0 {
                    context.fail(&format!("handler never called: {}", handler.describe()));
                }
            }
        }
        Ok(())
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}

pub(crate) fn router(state: ServerState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<ServerState>, request: Request) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            return DispatchError::bad_request(format!("failed to read request body: {err}"))
                .into_response();
        }
    };
    let request = FakeRequest::from_parts(parts, body);

    let handlers = state
        .handlers
        .read()
        .expect("handler list lock poisoned")
        .clone();

    let Some(handler) = find_handler(&handlers, &request) else {
        if !handlers.is_empty() {
            let registered: Vec<String> =
                handlers.iter().map(RequestHandler::describe).collect();
            let diagnostic = format!(
                "no handler matched {} {}; registered handlers: {}",
                request.method(),
                request.path(),
                registered.join(", ")
            );
            warn!("{diagnostic}");
            if let Some(context) = &state.context {
                context.log(&diagnostic);
            }
        }
        return DispatchError::UnmatchedRequest.into_response();
    };

    handler.record_call();

    if handler.has_assertions() {
        let context = state.context.as_deref().expect(
            "handler declares assertions but the server was started without a test context",
        );
        handler.run_assertions(context, &request);
    }

    let response = match handler.responder() {
        Some(responder) => responder(&request, &handler),
        None => respond(&handler),
    };
    info!(
        method = %request.method(),
        path = request.path(),
        status = %response.status(),
        "handled request"
    );
    response
}

/// Two-pass handler selection: first exact method+path+query, then a
/// path-only fallback that is used only when unambiguous.
fn find_handler(handlers: &[RequestHandler], request: &FakeRequest) -> Option<RequestHandler> {
    let mut fallback = Vec::new();
    for handler in handlers {
        if !handler.method_matches(request.method()) {
            continue;
        }
        if handler.exact_match(request.path(), request.raw_query()) {
            return Some(handler.clone());
        }
        if handler.path_matches(request.path()) {
            fallback.push(handler.clone());
        }
    }
    // only use the fallback if exactly one handler matched on path alone
    if fallback.len() == 1 { fallback.pop() } else { None }
}
