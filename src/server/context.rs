//! Per-request execution context.
//!
//! A [`Context`] owns one inbound request, the response state accumulated by
//! the handlers, and a cursor into the chain the request resolved to. The
//! chain drives itself: the dispatcher calls [`Context::next`] once and each
//! handler decides whether to call it again.

use serde::Serialize;

use crate::headers::Headers;
use crate::parser::{HttpRequest, Method};
use crate::server::error::Error;
use crate::server::handler::{Chain, HandlerFuture};
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::upgrade::{self, PendingUpgrade, WebSocketUpgrade};

/// The mutable state of one in-flight request.
///
/// A context is created by the dispatcher for exactly one request and
/// dropped once the response has been produced.
pub struct Context {
    request: HttpRequest,
    headers: Headers,
    status: StatusCode,
    status_text: Option<String>,
    body: Option<Vec<u8>>,
    chain: Chain,
    cursor: usize,
    upgrade: Option<PendingUpgrade>,
}

impl Context {
    /// Create a context for `request` that will run `chain`.
    pub fn new(request: HttpRequest, chain: Chain) -> Self {
        Self {
            request,
            headers: Headers::new(),
            status: StatusCode::OK,
            status_text: None,
            body: None,
            chain,
            cursor: 0,
            upgrade: None,
        }
    }

    /// Run the next handler in the chain and wait for it to finish.
    ///
    /// The cursor moves before the handler runs, so a handler that calls
    /// `next` resumes at the following handler and can never re-enter
    /// itself. Once the chain is exhausted this is a no-op.
    pub fn next(&mut self) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(handler) = self.chain.get(self.cursor).cloned() else {
                return Ok(());
            };
            self.cursor += 1;
            handler(self).await
        })
    }

    /// Respond with `body` and status 200.
    ///
    /// Does not stop the chain; the last call before the chain ends wins.
    pub fn send(&mut self, body: impl Into<Vec<u8>>) {
        self.send_with_status(body, StatusCode::OK);
    }

    /// Respond with `body` and an explicit status.
    pub fn send_with_status(&mut self, body: impl Into<Vec<u8>>, status: impl Into<StatusCode>) {
        self.body = Some(body.into());
        self.status = status.into();
    }

    /// Respond with `data` serialized as JSON and status 200.
    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), Error> {
        self.json_with_status(data, StatusCode::OK)
    }

    /// Respond with `data` serialized as JSON and an explicit status.
    pub fn json_with_status<T: Serialize + ?Sized>(
        &mut self,
        data: &T,
        status: impl Into<StatusCode>,
    ) -> Result<(), Error> {
        let payload = serde_json::to_vec(data)?;
        self.headers.set("Content-Type", "application/json");
        self.send_with_status(payload, status);
        Ok(())
    }

    /// Ask for the connection to be upgraded to a WebSocket.
    ///
    /// After a successful call the request is answered with
    /// `101 Switching Protocols` no matter what else the chain sends.
    /// Fails when the request is not a WebSocket handshake or an upgrade was
    /// already requested.
    pub fn upgrade(&mut self) -> Result<WebSocketUpgrade, Error> {
        if self.upgrade.is_some() {
            return Err(Error::UpgradeRejected("upgrade already requested for this request".to_string()));
        }

        let (pending, handle) = upgrade::negotiate(&self.request)?;
        self.upgrade = Some(pending);
        Ok(handle)
    }

    /// Whether a handler has requested an upgrade.
    pub fn is_upgraded(&self) -> bool {
        self.upgrade.is_some()
    }

    /// The inbound request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// The request target as the client sent it.
    pub fn url(&self) -> &str {
        &self.request.target
    }

    /// The status the response will carry.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<StatusCode>) {
        self.status = status.into();
    }

    /// The reason phrase the response will carry.
    pub fn status_text(&self) -> &str {
        self.status_text.as_deref().unwrap_or(self.status.reason_phrase())
    }

    /// Replace the standard reason phrase on the status line.
    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = Some(text.into());
    }

    /// Whether the current status is in the 2xx range.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Read a header the client sent.
    pub fn get(&self, name: &str) -> Option<String> {
        self.request.headers.get(name)
    }

    /// Check for a header the client sent.
    pub fn has(&self, name: &str) -> bool {
        self.request.headers.has(name)
    }

    /// Set an outbound header, replacing existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Add an outbound header value.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Remove an outbound header.
    pub fn delete(&mut self, name: &str) {
        self.headers.delete(name);
    }

    /// Outbound `Set-Cookie` values.
    pub fn get_set_cookie(&self) -> Vec<String> {
        self.headers.get_set_cookie()
    }

    /// The outbound header set.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Snapshot the response as it stands.
    ///
    /// Once an upgrade has been requested this is always the `101` response.
    pub fn to_response(&self) -> HttpResponse {
        if let Some(pending) = &self.upgrade {
            return pending.response().clone();
        }

        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            status_text: self.status_text.clone(),
        }
    }

    /// Consume the context, yielding the final response and any pending
    /// upgrade.
    pub(crate) fn finish(self) -> (HttpResponse, Option<PendingUpgrade>) {
        match self.upgrade {
            Some(pending) => (pending.response().clone(), Some(pending)),
            None => (
                HttpResponse {
                    status: self.status,
                    headers: self.headers,
                    body: self.body,
                    status_text: self.status_text,
                },
                None,
            ),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("status", &self.status)
            .field("cursor", &self.cursor)
            .field("chain_len", &self.chain.len())
            .field("upgraded", &self.upgrade.is_some())
            .finish()
    }
}
