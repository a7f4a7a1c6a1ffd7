//! Upgrades `/socket` to a WebSocket that answers `ping` with `pong`.
//!
//! Try it with any WebSocket client, e.g. `websocat ws://127.0.0.1:8082/socket`.

use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use microroute_rs::{App, HttpServer, ServerConfig, handler};
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut app = HttpServer::new();

    app.get("/socket", [handler(|ctx| Box::pin(async move {
        let upgrade = ctx.upgrade()?;

        // The stream is only handed over after the 101 response is written,
        // so the session has to run on its own task.
        tokio::spawn(async move {
            let mut ws = match upgrade.into_websocket().await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("Upgrade failed: {e}");
                    return;
                }
            };
            info!("WebSocket session opened");

            while let Some(message) = ws.next().await {
                let reply = match message {
                    Ok(message) if message == Message::text("ping") => Message::text("pong"),
                    Ok(Message::Close(_)) => break,
                    Ok(message @ (Message::Text(_) | Message::Binary(_))) => message,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                };
                if ws.send(reply).await.is_err() {
                    break;
                }
            }
            info!("WebSocket session closed");
        });

        Ok(())
    }))]);

    app.get("/", [handler(|ctx| Box::pin(async move {
        ctx.send("Connect a WebSocket client to /socket");
        Ok(())
    }))]);

    let config = ServerConfig {
        addr: "127.0.0.1:8082".parse()?,
        ..ServerConfig::default()
    };
    app.run(config).await?;
    Ok(())
}
