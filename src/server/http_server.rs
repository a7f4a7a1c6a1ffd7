//! HTTP server implementation.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::signal;
use log::{debug, info, warn, error};
use std::net::SocketAddr;

use crate::parser::{message_length, parse_request};
use crate::server::app::App;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::{BoxFuture, Handler};
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::router::Router;

/// An HTTP server that dispatches every request through a [`Router`].
///
/// Register routes first, then call [`App::run`] (or [`HttpServer::serve`]
/// with a listener you bound yourself). [`App::close`] stops the accept loop
/// from any task holding a reference to the server.
pub struct HttpServer {
    router: Arc<Router>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServer {
    /// Create a server with no routes.
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            router: Arc::new(Router::new()),
            shutdown: Arc::new(shutdown),
        }
    }

    /// The registered routes.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable access for registration.
    ///
    /// If the server is already serving, the running accept loop keeps the
    /// routes it started with.
    pub fn router_mut(&mut self) -> &mut Router {
        Arc::make_mut(&mut self.router)
    }

    /// Log the registered endpoints.
    fn display_server_info(&self) {
        info!("Registered endpoints:");
        for (path, methods) in self.router.endpoints() {
            let methods = methods
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            info!("  {methods} {path}");
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(config: &ServerConfig) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(config.addr).await?;
        Ok(listener)
    }

    /// Spawn a task that turns Ctrl+C into a shutdown request.
    fn setup_ctrl_c_handler(shutdown: Arc<watch::Sender<bool>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    shutdown.send_replace(true);
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        })
    }

    /// Resolve once a shutdown has been requested.
    async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
        // An error means the sender is gone, which also means stop.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Handle a new connection.
    fn handle_new_connection(
        mut socket: TcpStream,
        addr: SocketAddr,
        semaphore: &Arc<Semaphore>,
        router: Arc<Router>,
        config: Arc<ServerConfig>,
        tasks: &mut JoinSet<()>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                tasks.spawn(async move {
                    let response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                        .with_content_type("text/plain")
                        .with_header("Connection", "close")
                        .with_body_string("Server is at capacity, please try again later");
                    let _ = socket.write_all(&response.to_bytes()).await;
                });
                return;
            }
        };

        debug!("Connection from {addr}");
        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::handle_connection(socket, &router, &config).await {
                match e {
                    Error::IoError(e) => error!("I/O error on connection from {addr}: {e}"),
                    e => debug!("Rejected request from {addr}: {e}"),
                }
            }
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");

        // Usually descriptor exhaustion; back off before retrying
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>, config: &ServerConfig) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let drained = tokio::time::timeout(config.shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timed out with {len} connections still open", len = tasks.len());
            tasks.abort_all();
        }

        info!("Server shutdown complete");
    }

    /// Accept and serve connections from `listener` until shutdown.
    ///
    /// The routes are fixed for the lifetime of this call.
    pub async fn serve(&self, listener: TcpListener, config: ServerConfig) -> Result<(), Error> {
        self.display_server_info();
        info!("Server listening on http://{addr}", addr = listener.local_addr()?);

        let router = self.router.clone();
        let config = Arc::new(config);
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        let mut tasks = JoinSet::new();

        let ctrl_c = Self::setup_ctrl_c_handler(self.shutdown.clone());
        let stopped = Self::shutdown_requested(self.shutdown.subscribe());
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                _ = &mut stopped => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            Self::handle_new_connection(
                                socket,
                                addr,
                                &semaphore,
                                router.clone(),
                                config.clone(),
                                &mut tasks,
                            );
                        }
                        Err(e) => Self::handle_connection_error(e).await,
                    }
                }

                // Reap finished connections so the set does not grow unbounded
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("Connection task failed: {e}");
                    }
                }
            }
        }

        ctrl_c.abort();
        drop(listener);
        Self::perform_shutdown(&mut tasks, &config).await;

        Ok(())
    }

    /// Serve a single request on `socket`.
    ///
    /// Reads until a complete request is buffered, dispatches it, and writes
    /// the response. A request that asked for an upgrade gets the stream
    /// handed over after the `101` response; any other connection is closed.
    pub async fn handle_connection<S>(mut socket: S, router: &Router, config: &ServerConfig) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut buf = Vec::with_capacity(config.read_buffer_size);
        let mut chunk = vec![0; config.read_buffer_size.max(1)];

        let length = loop {
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                if buf.is_empty() {
                    return Ok(()); // Connection closed
                }
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);

            match message_length(&buf) {
                Ok(Some(length)) if length <= config.max_request_size => break length,
                Ok(_) if buf.len() > config.max_request_size => {
                    let err = Error::status(StatusCode::PAYLOAD_TOO_LARGE, "Request too large");
                    Self::write_and_close(&mut socket, err.to_response()).await?;
                    return Err(err);
                }
                Ok(_) => continue,
                Err(e) => {
                    let err = Error::ParseError(e);
                    Self::write_and_close(&mut socket, err.to_response()).await?;
                    return Err(err);
                }
            }
        };

        let request = match parse_request(&buf[..length]) {
            Ok(request) => request,
            Err(e) => {
                let err = Error::ParseError(e);
                Self::write_and_close(&mut socket, err.to_response()).await?;
                return Err(err);
            }
        };

        let outcome = router.dispatch(request).await;
        if outcome.is_upgrade() {
            socket.write_all(&outcome.response.to_bytes()).await?;
            socket.flush().await?;
            outcome.complete_upgrade(Box::new(socket));
            return Ok(());
        }

        Self::write_and_close(&mut socket, outcome.response).await
    }

    async fn write_and_close<S>(socket: &mut S, response: HttpResponse) -> Result<(), Error>
    where
        S: AsyncWrite + Unpin,
    {
        let response = response.with_header("Connection", "close");
        socket.write_all(&response.to_bytes()).await?;
        socket.shutdown().await?;
        Ok(())
    }
}

impl App for HttpServer {
    fn use_middleware(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) {
        self.router_mut().use_middleware(path, handlers);
    }

    fn get(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) {
        self.router_mut().get(path, handlers);
    }

    fn post(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) {
        self.router_mut().post(path, handlers);
    }

    fn put(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) {
        self.router_mut().put(path, handlers);
    }

    fn delete(&mut self, path: &str, handlers: impl IntoIterator<Item = Handler>) {
        self.router_mut().delete(path, handlers);
    }

    fn run(&self, config: ServerConfig) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let listener = Self::setup_listener(&config).await?;
            self.serve(listener, config).await
        })
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
    }
}
