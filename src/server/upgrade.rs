//! WebSocket upgrade hand-off.
//!
//! A handler asks for an upgrade through [`Context::upgrade`]. The context
//! then answers with `101 Switching Protocols` instead of whatever the chain
//! sent, and once the connection layer has written that response it passes
//! the raw stream through a oneshot channel to the [`WebSocketUpgrade`]
//! handle the handler received.
//!
//! [`Context::upgrade`]: crate::server::context::Context::upgrade

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::parser::HttpRequest;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};

/// A bidirectional byte stream a connection can be handed off as.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// The raw connection after the `101` response has been written.
pub type Upgraded = Box<dyn Io>;

/// Handle returned to the handler that requested an upgrade.
pub struct WebSocketUpgrade {
    rx: oneshot::Receiver<Upgraded>,
}

impl std::fmt::Debug for WebSocketUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketUpgrade").finish_non_exhaustive()
    }
}

impl WebSocketUpgrade {
    /// Wait for the connection to be handed over.
    ///
    /// Fails if the request ended without the upgrade response being sent,
    /// e.g. because a later handler in the chain failed.
    pub async fn on_upgrade(self) -> Result<Upgraded, Error> {
        self.rx.await.map_err(|_| {
            Error::UpgradeRejected("connection closed before the upgrade completed".to_string())
        })
    }

    /// Wait for the hand-off and wrap the stream as a server-side WebSocket.
    pub async fn into_websocket(self) -> Result<WebSocketStream<Upgraded>, Error> {
        let io = self.on_upgrade().await?;
        Ok(WebSocketStream::from_raw_socket(io, Role::Server, None).await)
    }
}

/// The server half of an accepted upgrade, kept by the context.
pub(crate) struct PendingUpgrade {
    response: HttpResponse,
    tx: oneshot::Sender<Upgraded>,
}

impl PendingUpgrade {
    /// The `101` response that replaces anything the chain sent.
    pub(crate) fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// Hand the connection to the waiting handler.
    pub(crate) fn complete(self, io: Upgraded) {
        if self.tx.send(io).is_err() {
            debug!("Upgrade handle dropped before the connection was handed over");
        }
    }
}

impl std::fmt::Debug for PendingUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUpgrade")
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

fn header_has_token(request: &HttpRequest, name: &str, token: &str) -> bool {
    request.headers.get_all(name).any(|value| {
        value
            .split(',')
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    })
}

/// Validate a WebSocket upgrade request and prepare both halves of the
/// hand-off.
pub(crate) fn negotiate(request: &HttpRequest) -> Result<(PendingUpgrade, WebSocketUpgrade), Error> {
    if !header_has_token(request, "Upgrade", "websocket") {
        return Err(Error::UpgradeRejected(
            "Invalid Header: 'upgrade' header must contain 'websocket'".to_string(),
        ));
    }
    if !header_has_token(request, "Connection", "upgrade") {
        return Err(Error::UpgradeRejected(
            "Invalid Header: 'connection' header must contain 'Upgrade'".to_string(),
        ));
    }
    let key = request.get_header("Sec-WebSocket-Key").ok_or_else(|| {
        Error::UpgradeRejected("Invalid Header: 'sec-websocket-key' header must be set".to_string())
    })?;

    let response = HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", derive_accept_key(key.trim().as_bytes()));

    let (tx, rx) = oneshot::channel();
    Ok((PendingUpgrade { response, tx }, WebSocketUpgrade { rx }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use crate::parser::{HttpVersion, Method};

    fn upgrade_request() -> HttpRequest {
        HttpRequest::new(Method::GET, "/socket", HttpVersion::Http11, Headers::new())
            .with_header("Host", "localhost")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "keep-alive, Upgrade")
            .with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .with_header("Sec-WebSocket-Version", "13")
    }

    #[test]
    fn test_accept_key_follows_rfc_6455() {
        let (pending, _handle) = negotiate(&upgrade_request()).unwrap();
        let response = pending.response();

        assert_eq!(response.status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers.get("Sec-WebSocket-Accept").as_deref(),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn test_plain_request_is_rejected() {
        let request = HttpRequest::new(Method::GET, "/socket", HttpVersion::Http11, Headers::new())
            .with_header("Host", "localhost");
        assert!(matches!(negotiate(&request), Err(Error::UpgradeRejected(_))));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let mut request = upgrade_request();
        request.headers.delete("Sec-WebSocket-Key");
        let err = negotiate(&request).unwrap_err();
        assert!(err.to_string().contains("sec-websocket-key"));
    }

    #[tokio::test]
    async fn test_dropped_pending_upgrade_fails_the_handle() {
        let (pending, handle) = negotiate(&upgrade_request()).unwrap();
        drop(pending);
        assert!(matches!(handle.on_upgrade().await, Err(Error::UpgradeRejected(_))));
    }

    #[tokio::test]
    async fn test_completed_upgrade_hands_over_the_stream() {
        let (pending, handle) = negotiate(&upgrade_request()).unwrap();
        let (server_side, _client_side) = tokio::io::duplex(64);
        pending.complete(Box::new(server_side));
        assert!(handle.on_upgrade().await.is_ok());
    }
}
