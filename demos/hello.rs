//! A basic server demonstrating routing and per-path middleware.

use log::info;
use microroute_rs::{App, HttpServer, ServerConfig, StatusCode, ServerError, handler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let mut app = HttpServer::new();

    // Log every request to "/" before it reaches the route handler
    app.use_middleware("/", [handler(|ctx| Box::pin(async move {
        info!("{} {}", ctx.method(), ctx.url());
        ctx.next().await?;
        info!("  -> {}", ctx.status());
        Ok(())
    }))]);

    app.get("/", [handler(|ctx| Box::pin(async move {
        ctx.send("Hello, world!");
        Ok(())
    }))]);

    // Greets by query parameter, e.g. /hello?name=Ada
    app.get("/hello", [handler(|ctx| Box::pin(async move {
        let name = ctx
            .request()
            .get_query_param("name")
            .cloned()
            .unwrap_or_else(|| "World".to_string());
        ctx.set("Content-Type", "text/plain");
        ctx.send(format!("Hello, {name}!"));
        Ok(())
    }))]);

    // Echo a JSON body back with 201
    app.post("/echo", [handler(|ctx| Box::pin(async move {
        if !ctx.request().is_json() {
            return Err(ServerError::status(StatusCode::BAD_REQUEST, "Expected a JSON body"));
        }
        let value: serde_json::Value = ctx.request().json()?;
        ctx.json_with_status(&value, StatusCode::CREATED)
    }))]);

    let config = ServerConfig {
        addr: "127.0.0.1:8081".parse()?,
        ..ServerConfig::default()
    };
    info!("Starting server on http://{}", config.addr);

    app.run(config).await?;
    Ok(())
}
