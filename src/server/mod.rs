//! HTTP server implementation for microroute-rs.
//!
//! Requests are resolved to an immutable handler chain by the [`Router`],
//! run against a per-request [`Context`], and answered by the connection
//! layer in [`HttpServer`].

mod response;
mod config;
mod error;
mod handler;
mod context;
mod router;
mod upgrade;
mod app;
mod http_server;
mod tests;

// Re-export public items
pub use response::{HttpResponse, StatusCode};
pub use config::ServerConfig;
pub use error::Error;
pub use handler::{BoxFuture, Chain, Handler, HandlerFuture, handler};
pub use context::Context;
pub use router::{Outcome, Router};
pub use upgrade::{Io, Upgraded, WebSocketUpgrade};
pub use app::App;
pub use http_server::HttpServer;
