//! Request handlers and handler chains.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::server::context::Context;
use crate::server::error::Error;

/// Type alias for a boxed, sendable future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type alias for the future a handler returns.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), Error>>;

/// A unit of work in a chain.
///
/// A handler receives the request's [`Context`] and may write a response
/// into it, call [`Context::next`] to run the rest of the chain, or do
/// neither. Failures are returned, never caught inside the chain.
pub type Handler = Arc<dyn for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync>;

/// An immutable, ordered sequence of handlers shared by every request that
/// resolves to it.
pub type Chain = Arc<[Handler]>;

/// Build a [`Handler`] from a closure.
///
/// The closure's signature is inferred from this function's bound, so the
/// usual `async` body needs no annotations:
///
/// ```
/// use microroute_rs::handler;
///
/// let hello = handler(|ctx| Box::pin(async move {
///     ctx.send("Hello, world!");
///     Ok(())
/// }));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Concatenate two handler sequences into a new chain.
pub(crate) fn compose(front: &[Handler], back: impl IntoIterator<Item = Handler>) -> Chain {
    front.iter().cloned().chain(back).collect()
}
