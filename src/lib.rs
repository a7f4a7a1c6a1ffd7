//! A minimal HTTP request dispatcher with per-path middleware chains.
//!
//! Handlers are registered per `(method, path)` pair and run as an ordered
//! chain. Each handler receives a [`Context`] for the request, may write a
//! response into it, and decides whether the rest of the chain runs by
//! calling [`Context::next`].
//!
//! # Features
//!
//! - Exact-path routing for GET, POST, PUT and DELETE
//! - Per-path middleware prepended to routes registered after it
//! - Per-request context with inbound and outbound headers
//! - JSON responses via serde
//! - Failures, including panics, become plain-text error responses
//! - WebSocket upgrade hand-off through tokio-tungstenite
//!
//! # Examples
//!
//! ## Routing with middleware
//!
//! ```no_run
//! use microroute_rs::{App, HttpServer, ServerConfig, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), microroute_rs::ServerError> {
//!     let mut app = HttpServer::new();
//!
//!     app.use_middleware("/", [handler(|ctx| Box::pin(async move {
//!         ctx.set("X-Powered-By", "microroute-rs");
//!         ctx.next().await
//!     }))]);
//!
//!     app.get("/", [handler(|ctx| Box::pin(async move {
//!         ctx.send("Hello, world!");
//!         Ok(())
//!     }))]);
//!
//!     app.run(ServerConfig::default()).await
//! }
//! ```
//!
//! ## Dispatching without a socket
//!
//! ```
//! use microroute_rs::{Router, StatusCode, handler, parse_request};
//!
//! # tokio_test_block(async {
//! let mut router = Router::new();
//! router.post("/users", [handler(|ctx| Box::pin(async move {
//!     ctx.json_with_status(&serde_json::json!({"id": 1}), StatusCode::CREATED)
//! }))]);
//!
//! let request = parse_request(b"POST /users HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! let outcome = router.dispatch(request).await;
//! assert_eq!(outcome.response.status, StatusCode::CREATED);
//! assert_eq!(outcome.response.body_text(), r#"{"id":1}"#);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
//! # }
//! ```
//!
//! See the `demos` directory for complete programs, including a WebSocket
//! echo server.

pub mod headers;

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use headers::Headers;
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use server::{
    App, Context, Error as ServerError, Handler, HttpResponse, HttpServer, Router, ServerConfig, StatusCode,
    WebSocketUpgrade, handler,
};
