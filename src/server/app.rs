//! The application capability interface.

use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::{BoxFuture, Handler};

/// What an application exposes to its authors: registration, serving, and
/// stopping.
///
/// Registration is expected to finish before [`App::run`] is called.
pub trait App {
    /// Register middleware for `path`, prepended to routes registered on
    /// that path afterwards.
    fn use_middleware(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>);

    fn get(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>);

    fn post(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>);

    fn put(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>);

    fn delete(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>);

    /// Serve until [`App::close`] is called.
    fn run(&self, config: ServerConfig) -> BoxFuture<'_, Result<(), Error>>;

    /// Stop accepting connections. In-flight requests run to completion.
    fn close(&self);
}
