use httpfake::{FakeRequest, FakeServer, RecordingContext};
use reqwest::StatusCode;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static SET_TRACING: std::sync::Once = std::sync::Once::new();
    SET_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .without_time()
            .init();
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_assertion_is_recorded_but_does_not_block_the_response() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .post("/users")
        .assert_header_value("Content-Type", "application/json")
        .reply(201)
        .body_string(r#"{"username": "dreamer"}"#);

    let client = reqwest::Client::new();
    let response = client
        .post(server.resolve_url("/users"))
        .header("Content-Type", "text/plain")
        .body(r#"{"username": "dreamer"}"#)
        .send()
        .await
        .expect("request should reach the fake server");

    // assertions never block the canned response
    assert_eq!(response.status(), StatusCode::CREATED);

    let failures = context.failures();
    assert_eq!(failures.len(), 1);
    assert!(
        failures[0].contains("expected text/plain to equal application/json"),
        "failure should name actual and expected: {}",
        failures[0]
    );

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn passing_assertions_record_only_intent_logs() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .get("/users?movie=dreamers")
        .assert_query_value("movie", "dreamers")
        .assert_queries(&["movie"])
        .reply(200)
        .body_string(r#"[{"username": "dreamer", "movie": "dreamers"}]"#);

    let response = reqwest::get(server.resolve_url("/users?movie=dreamers"))
        .await
        .expect("request should reach the fake server");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(context.failures().is_empty());
    assert_eq!(
        context.logs(),
        vec![
            "Testing request for a required query parameter value [movie: dreamers]",
            "Testing request for required query parameters",
        ]
    );

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_failing_assertion_does_not_skip_the_rest() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .post("/users")
        .assert_headers(&["Authorization"])
        .assert_query_value("movie", "dreamers")
        .reply(200);

    let client = reqwest::Client::new();
    let response = client
        .post(server.resolve_url("/users"))
        .send()
        .await
        .expect("request should reach the fake server");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(context.failures().len(), 2);
    assert_eq!(context.logs().len(), 2);

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_assertion_folds_ascii_case() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .put("/users/1")
        .assert_body(b"PRETTY BODY")
        .reply(200);

    let client = reqwest::Client::new();
    let response = client
        .put(server.resolve_url("/users/1"))
        .body("pretty body")
        .send()
        .await
        .expect("request should reach the fake server");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(context.failures().is_empty());

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_subset_assertion_allows_supersets_over_the_wire() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .post("/users")
        .assert_json_subset(&json!({"user": {"name": "dreamer"}}))
        .reply(201);

    let client = reqwest::Client::new();
    let response = client
        .post(server.resolve_url("/users"))
        .json(&json!({"user": {"name": "dreamer", "movie": "dreamers"}}))
        .send()
        .await
        .expect("request should reach the fake server");

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(context.failures().is_empty());

    let response = client
        .post(server.resolve_url("/users"))
        .json(&json!({"user": {"name": "other"}}))
        .send()
        .await
        .expect("request should reach the fake server");

    assert_eq!(response.status(), StatusCode::CREATED);
    let failures = context.failures();
    assert_eq!(failures.len(), 1);
    assert!(
        failures[0].contains(r#""user.name""#),
        "failure should name the mismatching path: {}",
        failures[0]
    );

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_assertor_closures_run_against_requests() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .post("/users")
        .assert_custom(|request: &FakeRequest| {
            if request.header("X-Request-Id").is_none() {
                anyhow::bail!("every request needs an X-Request-Id");
            }
            Ok(())
        })
        .reply(200);

    let client = reqwest::Client::new();
    client
        .post(server.resolve_url("/users"))
        .send()
        .await
        .expect("request should reach the fake server");

    let failures = context.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("every request needs an X-Request-Id"));
    assert!(
        context
            .logs()
            .contains(&"Testing request with a custom assertor".to_string())
    );

    server.close().await.expect("fake server should close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_reports_handlers_that_were_never_called() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .get("/users")
        .reply(200)
        .body_string("[]");

    server.close().await.expect("fake server should close");

    assert_eq!(context.failures(), vec!["handler never called: GET /users"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_is_quiet_when_every_handler_was_called() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server
        .register_handler()
        .get("/users")
        .reply(200)
        .body_string("[]");

    let response = reqwest::get(server.resolve_url("/users"))
        .await
        .expect("request should reach the fake server");
    assert_eq!(response.status(), StatusCode::OK);

    server.close().await.expect("fake server should close");

    assert!(context.failures().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unmatched_requests_log_the_registered_handlers() {
    init_tracing();
    let context = RecordingContext::new();
    let server = FakeServer::start_with_context(context.clone())
        .await
        .expect("fake server should start");

    server.register_handler().get("/users").reply(200);
    server.register_handler().post("/movies").reply(201);

    let response = reqwest::get(server.resolve_url("/unknown"))
        .await
        .expect("request should reach the fake server");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let diagnostic = context
        .logs()
        .into_iter()
        .find(|line| line.contains("no handler matched"))
        .expect("unmatched requests should log a diagnostic");
    assert!(diagnostic.contains("GET /users"));
    assert!(diagnostic.contains("POST /movies"));

    // the audit also flags both handlers, neither was ever called
    server.close().await.expect("fake server should close");
    assert_eq!(context.failures().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[should_panic(expected = "without a test context")]
async fn assertions_without_a_context_are_a_fatal_setup_error() {
    init_tracing();
    let server = FakeServer::start().await.expect("fake server should start");

    server
        .register_handler()
        .get("/users")
        .assert_headers(&["Authorization"]);
}
