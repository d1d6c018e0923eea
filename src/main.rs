//! Dynamic load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────────┐    ┌────────────────────┐
//!     ──────────────────▶│ http server  │───▶│  BackendPool       │
//!                        │ (dispatcher) │    │  └ Strategy        │
//!                        └──────┬───────┘    │    - round robin   │
//!                               │            │    - hash ring     │
//!                               ▼            └─────────▲──────────┘
//!                        ┌──────────────┐              │ add/remove
//!     Client Response    │   backend    │    ┌─────────┴──────────┐
//!     ◀──────────────────│   server     │◀───│  health monitor    │
//!                        └──────────────┘    │  GET /health probes│
//!                                            └────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use dynamic_load_balancer::config::{load_config, BalancerConfig};
use dynamic_load_balancer::lifecycle::Shutdown;
use dynamic_load_balancer::load_balancer::StrategyKind;
use dynamic_load_balancer::observability::{logging, metrics};
use dynamic_load_balancer::HttpServer;

#[derive(Parser)]
#[command(name = "dynamic-load-balancer")]
#[command(about = "HTTP load balancer with round-robin and consistent hashing strategies", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load balancing strategy (round-robin or consistent-hashing).
    #[arg(short, long, env = "LOAD_BALANCER_STRATEGY")]
    strategy: Option<StrategyKind>,

    /// Address to listen on.
    #[arg(short, long)]
    bind: Option<String>,

    /// Virtual nodes per backend for consistent hashing.
    #[arg(long)]
    vnodes: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut BalancerConfig) {
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(vnodes) = self.vnodes {
            config.virtual_nodes = vnodes;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BalancerConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability.log_level);
    tracing::info!("dynamic-load-balancer v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        strategy = %config.strategy,
        backends = config.backends.len(),
        virtual_nodes = config.virtual_nodes,
        health_checks = config.health_check.enabled && config.strategy == StrategyKind::ConsistentHashing,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal = shutdown.clone();
    tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
