//! Tests for the HTTP server implementation.

#[cfg(test)]
mod server_tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time;
    use tokio_tungstenite::tungstenite::Message;

    use crate::headers::Headers;
    use crate::parser::{HttpRequest, HttpVersion, Method};
    use crate::server::{App, Error, Handler, HttpServer, Router, ServerConfig, StatusCode, handler};

    fn request(method: Method, target: &str) -> HttpRequest {
        HttpRequest::new(method, target, HttpVersion::Http11, Headers::new()).with_header("Host", "localhost")
    }

    fn send(body: &'static str) -> Handler {
        handler(move |ctx| Box::pin(async move {
            ctx.send(body);
            Ok(())
        }))
    }

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = log.clone();
        handler(move |ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                ctx.next().await
            })
        })
    }

    /// Feed `raw` to a connection handler over an in-memory pipe and collect
    /// everything it writes back.
    async fn exchange(router: &Router, config: &ServerConfig, raw: &[u8]) -> (Result<(), Error>, String) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        client.shutdown().await.unwrap();

        let result = HttpServer::handle_connection(server, router, config).await;

        let mut written = Vec::new();
        client.read_to_end(&mut written).await.unwrap();
        (result, String::from_utf8_lossy(&written).into_owned())
    }

    async fn start(app: HttpServer) -> (Arc<HttpServer>, SocketAddr, tokio::task::JoinHandle<Result<(), Error>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig { addr, ..ServerConfig::default() };

        let server = Arc::new(app);
        let serving = server.clone();
        let task = tokio::spawn(async move { serving.serve(listener, config).await });
        (server, addr, task)
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.max_request_size, 1024 * 1024);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));

        let config = ServerConfig::with_port(3000);
        assert_eq!(config.addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_hello_world() {
        let mut router = Router::new();
        router.get("/", [send("Hello, world!")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::OK);
        assert_eq!(outcome.response.body_text(), "Hello, world!");
        assert!(!outcome.is_upgrade());
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let router = Router::new();

        let outcome = router.dispatch(request(Method::GET, "/anything")).await;
        assert_eq!(outcome.response.status, StatusCode::NOT_FOUND);
        assert_eq!(outcome.response.body_text(), "Not found");
        assert_eq!(
            outcome.response.headers.get("Content-Type").as_deref(),
            Some("text/plain;charset=UTF-8")
        );
    }

    #[tokio::test]
    async fn test_unregistered_method_is_not_allowed() {
        let mut router = Router::new();
        router.get("/", [send("Hello, world!")]);

        let outcome = router.dispatch(request(Method::POST, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(outcome.response.body_text(), "Method not allowed");

        // HEAD is parsed but never registrable
        let outcome = router.dispatch(request(Method::HEAD, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_paths_match_exactly() {
        let mut router = Router::new();
        router.get("/users", [send("users")]);

        for path in ["/users/", "/Users", "/users/1"] {
            let outcome = router.dispatch(request(Method::GET, path)).await;
            assert_eq!(outcome.response.status, StatusCode::NOT_FOUND, "path {path}");
        }

        // The query string is not part of the path
        let outcome = router.dispatch(request(Method::GET, "/users?page=2")).await;
        assert_eq!(outcome.response.body_text(), "users");
        assert!(outcome.response.ok());
    }

    #[tokio::test]
    async fn test_middleware_runs_before_route_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware("/", [record(&log, "h1")]);
        router.get("/", [record(&log, "h2"), send("done")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.body_text(), "done");
        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_middleware_is_not_retroactive() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.get("/", [record(&log, "route"), send("ok")]);
        router.use_middleware("/", [record(&log, "late")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.body_text(), "ok");
        assert_eq!(*log.lock().unwrap(), vec!["route"]);
    }

    #[tokio::test]
    async fn test_middleware_only_applies_to_its_own_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware("/admin", [record(&log, "admin")]);
        router.get("/", [send("home")]);
        router.get("/admin", [send("admin")]);

        router.dispatch(request(Method::GET, "/")).await;
        assert!(log.lock().unwrap().is_empty());

        router.dispatch(request(Method::GET, "/admin")).await;
        assert_eq!(*log.lock().unwrap(), vec!["admin"]);
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let guard = || {
            handler(|ctx| Box::pin(async move {
                if *ctx.method() == Method::GET {
                    ctx.next().await
                } else {
                    ctx.send_with_status("blocked", StatusCode::CREATED);
                    Ok(())
                }
            }))
        };

        let mut router = Router::new();
        router.use_middleware("/", [guard()]);
        router.get("/", [send("ok")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::OK);
        assert_eq!(outcome.response.body_text(), "ok");

        // Middleware alone does not create a route
        let outcome = router.dispatch(request(Method::POST, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::METHOD_NOT_ALLOWED);

        // With a POST route the middleware answers before the route handler runs
        router.post("/", [send("never")]);
        let outcome = router.dispatch(request(Method::POST, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::CREATED);
        assert_eq!(outcome.response.body_text(), "blocked");
    }

    #[tokio::test]
    async fn test_handler_without_next_stops_the_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tail = {
            let counter = counter.clone();
            handler(move |_ctx| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        };

        let mut router = Router::new();
        router.get("/", [send("first"), tail]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.body_text(), "first");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_code_after_next_sees_downstream_response() {
        let wrap = handler(|ctx| Box::pin(async move {
            ctx.next().await?;
            let status = ctx.status();
            ctx.set("X-Downstream-Status", status.as_u16().to_string());
            Ok(())
        }));

        let mut router = Router::new();
        router.get("/", [wrap, send("inner")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.body_text(), "inner");
        assert_eq!(outcome.response.headers.get("X-Downstream-Status").as_deref(), Some("200"));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut router = Router::new();
        router.get("/", [send("first")]);
        router.get("/", [send("second")]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.body_text(), "second");
        assert_eq!(router.endpoints(), vec![("/".to_string(), vec![Method::GET])]);
    }

    #[tokio::test]
    async fn test_empty_chain_answers_200_without_body() {
        let mut router = Router::new();
        router.delete("/items", Vec::<Handler>::new());

        let outcome = router.dispatch(request(Method::DELETE, "/items")).await;
        assert_eq!(outcome.response.status, StatusCode::OK);
        assert!(outcome.response.body.is_none());
    }

    #[tokio::test]
    async fn test_json_response() {
        let mut router = Router::new();
        router.put("/users", [handler(|ctx| Box::pin(async move {
            let user: serde_json::Value = ctx.request().json()?;
            ctx.json_with_status(&serde_json::json!({"updated": user["name"]}), StatusCode::CREATED)
        }))]);

        let req = request(Method::PUT, "/users")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"Ada"}"#);
        let outcome = router.dispatch(req).await;
        assert_eq!(outcome.response.status.as_u16(), 201);
        assert_eq!(outcome.response.headers.get("content-type").as_deref(), Some("application/json"));
        assert_eq!(outcome.response.body_text(), r#"{"updated":"Ada"}"#);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500_with_its_message() {
        let mut router = Router::new();
        router.get("/", [handler(|ctx| Box::pin(async move {
            ctx.send("partial");
            Err(Error::handler(std::io::Error::other("database unavailable")))
        }))]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.response.body_text(), "database unavailable");
        assert_eq!(
            outcome.response.headers.get("Content-Type").as_deref(),
            Some("text/plain;charset=UTF-8")
        );
    }

    #[tokio::test]
    async fn test_bad_json_body_inside_handler_is_a_handler_failure() {
        let mut router = Router::new();
        router.post("/users", [handler(|ctx| Box::pin(async move {
            let user: serde_json::Value = ctx.request().json()?;
            ctx.json(&user)
        }))]);

        let req = request(Method::POST, "/users")
            .with_header("Content-Type", "application/json")
            .with_body("{not json");
        let outcome = router.dispatch(req).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(outcome.response.body_text().starts_with("JSON parsing error"));
    }

    #[tokio::test]
    async fn test_structured_error_keeps_its_status() {
        let mut router = Router::new();
        router.post("/login", [handler(|ctx| Box::pin(async move {
            if !ctx.has("Authorization") {
                return Err(Error::status(StatusCode::UNAUTHORIZED, "missing credentials"));
            }
            ctx.send("welcome");
            Ok(())
        }))]);

        let outcome = router.dispatch(request(Method::POST, "/login")).await;
        assert_eq!(outcome.response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(outcome.response.body_text(), "missing credentials");

        let authorized = request(Method::POST, "/login").with_header("Authorization", "Bearer t");
        let outcome = router.dispatch(authorized).await;
        assert_eq!(outcome.response.body_text(), "welcome");
    }

    #[tokio::test]
    async fn test_error_with_empty_message_uses_generic_body() {
        let mut router = Router::new();
        router.get("/", [handler(|_ctx| Box::pin(async move {
            Err(Error::InternalError(String::new()))
        }))]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.response.body_text(), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_500() {
        let mut router = Router::new();
        router.get("/", [handler(|ctx| Box::pin(async move {
            ctx.send("partial");
            if ctx.path() == "/" {
                panic!("handler blew up");
            }
            Ok(())
        }))]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.response.body_text(), "Internal Server Error");

        // The router is still usable afterwards
        router.get("/ok", [send("fine")]);
        let outcome = router.dispatch(request(Method::GET, "/ok")).await;
        assert_eq!(outcome.response.body_text(), "fine");
    }

    #[tokio::test]
    async fn test_failure_after_next_discards_partial_response() {
        let mut router = Router::new();
        router.get("/", [
            handler(|ctx| Box::pin(async move {
                ctx.set("X-Partial", "yes");
                ctx.next().await?;
                Err(Error::InternalError("late failure".to_string()))
            })),
            send("almost"),
        ]);

        let outcome = router.dispatch(request(Method::GET, "/")).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.response.body_text(), "late failure");
        assert!(!outcome.response.headers.has("X-Partial"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_isolated() {
        let echo = handler(|ctx| Box::pin(async move {
            let id = ctx.get("X-Request-Id").unwrap_or_default();
            ctx.set("X-Request-Id", id.clone());
            tokio::task::yield_now().await;
            time::sleep(Duration::from_millis(5)).await;
            ctx.send(format!("request {id}"));
            Ok(())
        }));

        let mut router = Router::new();
        router.get("/echo", [echo]);

        let a = request(Method::GET, "/echo").with_header("X-Request-Id", "a");
        let b = request(Method::GET, "/echo").with_header("X-Request-Id", "b");
        let (a, b) = tokio::join!(router.dispatch(a), router.dispatch(b));

        assert_eq!(a.response.body_text(), "request a");
        assert_eq!(a.response.headers.get("X-Request-Id").as_deref(), Some("a"));
        assert_eq!(b.response.body_text(), "request b");
        assert_eq!(b.response.headers.get("X-Request-Id").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_upgrade_rejected_without_handshake_headers() {
        let mut router = Router::new();
        router.get("/socket", [handler(|ctx| Box::pin(async move {
            let _upgrade = ctx.upgrade()?;
            Ok(())
        }))]);

        let outcome = router.dispatch(request(Method::GET, "/socket")).await;
        assert_eq!(outcome.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(outcome.response.body_text().contains("upgrade"));
        assert!(!outcome.is_upgrade());
    }

    #[tokio::test]
    async fn test_handle_connection_with_valid_request() {
        let mut router = Router::new();
        router.get("/test", [handler(|ctx| Box::pin(async move {
            ctx.set("Content-Type", "text/plain");
            ctx.send("Test response");
            Ok(())
        }))]);

        let (result, response) =
            exchange(&router, &ServerConfig::default(), b"GET /test HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/plain\r\n"));
        assert!(response.contains("Content-Length: 13\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with("\r\n\r\nTest response"));
    }

    #[tokio::test]
    async fn test_handle_connection_with_not_found() {
        let router = Router::new();

        let (result, response) =
            exchange(&router, &ServerConfig::default(), b"GET /nonexistent HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.ends_with("Not found"));
    }

    #[tokio::test]
    async fn test_handle_connection_with_method_not_allowed() {
        let mut router = Router::new();
        router.get("/test", [send("Test response")]);

        let (result, response) =
            exchange(&router, &ServerConfig::default(), b"POST /test HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(response.ends_with("Method not allowed"));
    }

    #[tokio::test]
    async fn test_handle_connection_with_invalid_request() {
        let router = Router::new();

        let (result, response) = exchange(&router, &ServerConfig::default(), b"INVALID REQUEST").await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Parse error:"));
    }

    #[tokio::test]
    async fn test_handle_connection_routes_unknown_methods() {
        let mut router = Router::new();
        router.get("/", [send("Hello, world!")]);
        let config = ServerConfig::default();

        let (result, response) = exchange(&router, &config, b"TRACE / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let (result, response) = exchange(&router, &config, b"BREW /pot HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

        // Not a token at all
        let (result, response) = exchange(&router, &config, b"GE(T / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_handle_connection_with_overflowing_content_length() {
        let router = Router::new();
        let raw = format!("GET / HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n", usize::MAX);

        let (result, response) = exchange(&router, &ServerConfig::default(), raw.as_bytes()).await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_handle_connection_rejects_oversized_request() {
        let router = Router::new();
        let config = ServerConfig { max_request_size: 64, ..ServerConfig::default() };
        let raw = format!("GET / HTTP/1.1\r\nHost: localhost\r\nX-Padding: {}\r\n\r\n", "x".repeat(128));

        let (result, response) = exchange(&router, &config, raw.as_bytes()).await;

        assert!(matches!(result, Err(Error::Status { .. })));
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn test_handle_connection_reads_body_across_small_reads() {
        let mut router = Router::new();
        router.post("/echo", [handler(|ctx| Box::pin(async move {
            let body = ctx.request().body.clone();
            ctx.send_with_status(body, StatusCode::CREATED);
            Ok(())
        }))]);
        let config = ServerConfig { read_buffer_size: 7, ..ServerConfig::default() };
        let raw = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 14\r\n\r\n{\"name\":\"Ada\"}";

        let (result, response) = exchange(&router, &config, raw).await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(response.ends_with("{\"name\":\"Ada\"}"));
    }

    #[tokio::test]
    async fn test_handle_connection_with_empty_connection() {
        let router = Router::new();

        let (result, response) = exchange(&router, &ServerConfig::default(), b"").await;

        assert!(result.is_ok());
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_serve_and_close() {
        let mut app = HttpServer::new();
        app.get("/", [send("Hello, world!")]);
        let (server, addr, task) = start(app).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("Hello, world!"));

        server.close();
        let result = time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_close_before_serve_returns_immediately() {
        let app = HttpServer::new();
        app.close();
        let (_server, _addr, task) = start(app).await;

        let result = time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_registration_through_app_trait() {
        let mut app = HttpServer::new();
        app.use_middleware("/items", [send("mw")]);
        app.get("/items", [send("get")]);
        app.post("/items", [send("post")]);
        app.put("/items", [send("put")]);
        app.delete("/items", [send("delete")]);

        let endpoints = app.router().endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].1.len(), 4);

        // Middleware registered first answers every method
        let outcome = app.router().dispatch(request(Method::DELETE, "/items")).await;
        assert_eq!(outcome.response.body_text(), "mw");
    }

    #[tokio::test]
    async fn test_websocket_upgrade() {
        let mut app = HttpServer::new();
        app.get("/socket", [handler(|ctx| Box::pin(async move {
            let upgrade = ctx.upgrade()?;
            tokio::spawn(async move {
                let Ok(mut ws) = upgrade.into_websocket().await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message == Message::text("ping") && ws.send(Message::text("pong")).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        }))]);
        let (server, addr, task) = start(app).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut ws, response) = tokio_tungstenite::client_async(format!("ws://{addr}/socket"), stream)
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 101);

        ws.send(Message::text("ping")).await.unwrap();
        let reply = time::timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply, Message::text("pong"));

        ws.close(None).await.unwrap();
        server.close();
        let result = time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
