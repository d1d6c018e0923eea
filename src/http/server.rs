//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request timeout)
//! - Dispatch requests to the selection strategy
//! - Forward requests to the selected backend
//! - Report failed backends for ring repair
//! - Spawn the health monitor alongside the server

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{validate_config, BalancerConfig, ConfigError};
use crate::health::probe::HttpProbe;
use crate::load_balancer::{BackendPool, IncomingRequest};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: BackendPool,
    pub client: Client<HttpConnector, Body>,
    /// Budget for the upstream exchange; below the request timeout.
    pub upstream_timeout: Duration,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    pool: BackendPool,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The configuration is validated first, so one built in code gets the
    /// same checks as one loaded from a file.
    pub fn new(config: BalancerConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let pool = BackendPool::from_config(&config).map_err(ConfigError::Strategy)?;
        Ok(Self::with_pool(config, pool))
    }

    fn with_pool(config: BalancerConfig, pool: BackendPool) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            pool: pool.clone(),
            client,
            upstream_timeout: upstream_budget(config.timeouts.request_secs),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pool,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BalancerConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/topology", get(topology_handler))
            .route("/backends", get(backends_handler))
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = %self.pool.kind(),
            "Load balancer listening"
        );

        let monitor = if self.config.health_check.enabled {
            self.pool
                .health_monitor(
                    HttpProbe::new(self.config.health_check.path.clone()),
                    self.config.health_check.clone(),
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?
                .map(|monitor| monitor.spawn(shutdown.resubscribe()))
        } else {
            None
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }
}

/// Nine tenths of the request timeout, so a silent backend is reported
/// before the outer timeout layer answers the client.
fn upstream_budget(request_secs: u64) -> Duration {
    Duration::from_secs(request_secs) * 9 / 10
}

/// Liveness of the load balancer itself.
async fn health_handler() -> &'static str {
    "OK"
}

/// Current strategy topology as plain text.
async fn topology_handler(State(state): State<AppState>) -> String {
    state.pool.describe_topology()
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub address: String,
    pub healthy: bool,
    pub requests: u64,
}

async fn backends_handler(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .pool
        .all_backends()
        .iter()
        .map(|b| BackendStatus {
            address: b.key(),
            healthy: b.is_healthy(),
            requests: b.request_count(),
        })
        .collect();
    Json(statuses)
}

/// Main proxy handler.
/// Selects a backend for the request URI and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let method = request.method().clone();

    let backend = match state.pool.get(&IncomingRequest::new(path_and_query.clone())) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(path = %path_and_query, error = %e, "No healthy backends available to handle the request");
            metrics::record_request("none", StatusCode::SERVICE_UNAVAILABLE.as_u16());
            return (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends available").into_response();
        }
    };

    tracing::debug!(
        method = %method,
        path = %path_and_query,
        backend = %backend,
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();
    parts.uri = match format!("{}{}", backend.base_url(), path_and_query).parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(path = %path_and_query, error = %e, "Cannot build upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
        }
    };
    parts.version = Version::HTTP_11;
    parts.headers.remove(header::HOST);

    let key = backend.key();
    let upstream = state.client.request(Request::from_parts(parts, body));
    match time::timeout(state.upstream_timeout, upstream).await {
        Ok(Ok(response)) if response.status() == StatusCode::OK => {
            metrics::record_request(&key, StatusCode::OK.as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Ok(response)) => {
            tracing::warn!(backend = %backend, status = %response.status(), "Backend returned an error status");
            metrics::record_request(&key, response.status().as_u16());
            state.pool.report_failure(&backend);
            (StatusCode::SERVICE_UNAVAILABLE, "Backend is currently unavailable").into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(backend = %backend, error = %e, "Error connecting to backend");
            metrics::record_request(&key, StatusCode::BAD_GATEWAY.as_u16());
            state.pool.report_failure(&backend);
            (StatusCode::SERVICE_UNAVAILABLE, "Backend is currently unavailable").into_response()
        }
        Err(_) => {
            tracing::error!(
                backend = %backend,
                timeout_ms = state.upstream_timeout.as_millis() as u64,
                "Backend did not answer in time"
            );
            metrics::record_request(&key, StatusCode::GATEWAY_TIMEOUT.as_u16());
            state.pool.report_failure(&backend);
            (StatusCode::SERVICE_UNAVAILABLE, "Backend is currently unavailable").into_response()
        }
    }
}
