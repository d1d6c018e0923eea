//! Demo backend server.
//!
//! Answers `/health` with `OK` and every other path with a message naming its
//! port, so the balancer's routing decisions are visible from the client.

use std::net::SocketAddr;

use axum::{extract::State, http::Uri, routing::get, Router};
use clap::Parser;
use dynamic_load_balancer::observability::logging;

#[derive(Parser)]
#[command(name = "backend-server")]
#[command(about = "Demo backend for the dynamic load balancer", long_about = None)]
struct Cli {
    /// Port for the server to listen on.
    #[arg(short, long, default_value_t = 8080, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

async fn handle(State(port): State<u16>, uri: Uri) -> String {
    let msg = format!("Received request on server running on port {}", port);
    tracing::info!(port, path = %uri, "{}", msg);
    msg
}

fn app(port: u16) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(handle)
        .with_state(port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init("info");

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server running on port {}", cli.port);

    axum::serve(listener, app(cli.port)).await?;
    Ok(())
}
