use std::net::SocketAddr;
use std::sync::Arc;

use inpaint_relay::{api, config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    config::Config::dotenv_load();
    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    config::Config::print_env_vars();

    let host_str = config.api_host.clone();
    let port_str = config.api_port.clone();
    let state = match api::routes::AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Failed to build backend client: {}", e);
            std::process::exit(1);
        }
    };
    let app = api::routes::router(state);

    // Run our application with safe parsing
    let ip: std::net::IpAddr = host_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 127.0.0.1", host_str);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let port: u16 = port_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8000", port_str);
        8000
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("listening on {}", socket_address);
    if let Err(e) = hyper::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
