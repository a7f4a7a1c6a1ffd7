//! Route registry, registration, and request dispatch.

use std::collections::HashMap;

use log::{debug, warn};

use crate::parser::{HttpRequest, Method};
use crate::server::context::Context;
use crate::server::error::Error;
use crate::server::handler::{Chain, Handler, compose};
use crate::server::response::HttpResponse;
use crate::server::upgrade::{PendingUpgrade, Upgraded};

/// The result of dispatching one request.
#[derive(Debug)]
pub struct Outcome {
    /// The response to write back.
    pub response: HttpResponse,
    upgrade: Option<PendingUpgrade>,
}

impl Outcome {
    fn from_error(err: &Error) -> Self {
        Self {
            response: err.to_response(),
            upgrade: None,
        }
    }

    /// Whether the connection should be handed off after the response.
    pub fn is_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }

    /// Hand the connection to the handler that requested the upgrade.
    /// Does nothing for an ordinary response.
    pub fn complete_upgrade(self, io: Upgraded) {
        if let Some(pending) = self.upgrade {
            pending.complete(io);
        }
    }
}

/// Routes and per-path middleware.
///
/// Paths match by exact string equality. A route's chain is composed when it
/// is registered and never changes afterwards: middleware registered for a
/// path only applies to routes registered on that path later.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, HashMap<Method, Chain>>,
    middleware: HashMap<String, Chain>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handlers` as the middleware chain for `path`, replacing any
    /// earlier middleware for the same path.
    pub fn use_middleware(&mut self, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        let path = path.into();
        let chain: Chain = handlers.into_iter().collect();
        debug!("Middleware for {path}: {len} handler(s)", len = chain.len());
        self.middleware.insert(path, chain);
    }

    /// Install the chain for `(method, path)`.
    ///
    /// Middleware already registered for `path` runs first, followed by
    /// `handlers` in order. A later registration for the same pair replaces
    /// this one.
    pub fn route(&mut self, method: Method, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        let path = path.into();
        let front = self.middleware.get(&path).map(|chain| &chain[..]).unwrap_or_default();
        let chain = compose(front, handlers);

        debug!("Route {method} {path}: {len} handler(s)", len = chain.len());
        self.routes.entry(path).or_default().insert(method, chain);
    }

    pub fn get(&mut self, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        self.route(Method::GET, path, handlers);
    }

    pub fn post(&mut self, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        self.route(Method::POST, path, handlers);
    }

    pub fn put(&mut self, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        self.route(Method::PUT, path, handlers);
    }

    pub fn delete(&mut self, path: impl Into<String>, handlers: impl IntoIterator<Item = Handler>) {
        self.route(Method::DELETE, path, handlers);
    }

    /// Find the chain for a request.
    pub fn resolve(&self, path: &str, method: &Method) -> Result<Chain, Error> {
        let methods = self.routes.get(path).ok_or(Error::NotFound)?;
        methods.get(method).cloned().ok_or(Error::MethodNotAllowed)
    }

    /// Registered `(path, methods)` pairs, sorted for stable output.
    pub fn endpoints(&self) -> Vec<(String, Vec<Method>)> {
        let mut endpoints: Vec<(String, Vec<Method>)> = self
            .routes
            .iter()
            .map(|(path, methods)| {
                let mut methods: Vec<Method> = methods.keys().cloned().collect();
                methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                (path.clone(), methods)
            })
            .collect();
        endpoints.sort_by(|a, b| a.0.cmp(&b.0));
        endpoints
    }

    /// Dispatch a request through its chain and produce the response.
    ///
    /// This is the only place failures become responses: routing failures,
    /// errors returned by handlers, and handler panics all end here. Whatever
    /// the chain had sent before failing is discarded.
    pub async fn dispatch(&self, request: HttpRequest) -> Outcome {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.run_chain(request).await {
            Ok(outcome) => {
                debug!("{method} {path} -> {status}", status = outcome.response.status);
                outcome
            }
            Err(err) => {
                match &err {
                    Error::NotFound | Error::MethodNotAllowed => {
                        debug!("{method} {path} -> {err}");
                    }
                    _ => warn!("{method} {path} failed: {err}"),
                }
                Outcome::from_error(&err)
            }
        }
    }

    async fn run_chain(&self, request: HttpRequest) -> Result<Outcome, Error> {
        let chain = self.resolve(&request.path, &request.method)?;
        let mut ctx = Context::new(request, chain);

        // The chain runs on its own task so a panicking handler surfaces as
        // a join error instead of unwinding through the connection.
        let task = tokio::spawn(async move {
            let result = ctx.next().await;
            (ctx, result)
        });

        let (ctx, result) = task.await.map_err(|join_err| {
            if join_err.is_panic() {
                warn!("Handler panicked");
            }
            Error::Unknown
        })?;
        result.map_err(Error::into_chain_failure)?;

        let (response, upgrade) = ctx.finish();
        Ok(Outcome { response, upgrade })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("endpoints", &self.endpoints())
            .field("middleware", &self.middleware.keys().collect::<Vec<_>>())
            .finish()
    }
}
