//! A fake HTTP server with a chainable API for defining request handlers,
//! aimed at tests where the real external server must not be reached.
//!
//! Register handlers for the requests you expect, point the code under
//! test at [`FakeServer::base_url`], and optionally assert on what
//! arrives:
//!
//! ```rust
//! use httpfake::FakeServer;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let server = FakeServer::start().await.expect("start fake server");
//!
//! server
//!     .register_handler()
//!     .get("/users")
//!     .reply(200)
//!     .body_string(r#"[{"username": "dreamer"}]"#);
//!
//! let response = reqwest::get(server.resolve_url("/users"))
//!     .await
//!     .expect("reach fake server");
//! assert_eq!(response.status(), 200);
//! assert_eq!(
//!     response.text().await.expect("read body"),
//!     r#"[{"username": "dreamer"}]"#
//! );
//!
//! server.close().await.expect("close fake server");
//! # });
//! ```
//!
//! Unmatched requests get an empty 404 so tests fail loudly instead of
//! silently reaching something real. With a [`TestContext`] supplied at
//! start, per-request assertions report failures without blocking the
//! canned response, and [`FakeServer::close`] flags every handler that
//! was registered but never called.

mod assertions;
mod error;
mod handler;
mod report;
mod request;
mod responder;
mod response;
mod server;

pub use assertions::Assertor;
pub use handler::RequestHandler;
pub use report::{RecordingContext, TestContext};
pub use request::FakeRequest;
pub use responder::Responder;
pub use response::Response;
pub use server::FakeServer;
