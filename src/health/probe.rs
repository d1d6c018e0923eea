//! Liveness probes.

use std::future::Future;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::load_balancer::backend::Backend;

/// Why a backend failed its liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("probe timed out after {0} ms")]
    Timeout(u128),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid probe uri: {0}")]
    InvalidUri(String),
}

/// A liveness check against a single backend.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, backend: &Backend) -> impl Future<Output = Result<(), ProbeFailure>> + Send;
}

/// `GET http://host:port{path}`, healthy on `200 OK`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            path: path.into(),
            client,
        }
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeFailure> {
        let uri = format!("{}{}", backend.base_url(), self.path);
        let request = Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "dynamic-load-balancer-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeFailure::InvalidUri(format!("{}: {}", uri, e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeFailure::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        port
    }

    #[tokio::test]
    async fn test_probe_ok() {
        let port = serve(Router::new().route("/health", get(|| async { "OK" }))).await;
        let probe = HttpProbe::new("/health");
        assert_eq!(probe.probe(&Backend::new("127.0.0.1", port)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_probe_non_200_status() {
        let port = serve(Router::new().route(
            "/health",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        let probe = HttpProbe::new("/health");
        assert_eq!(
            probe.probe(&Backend::new("127.0.0.1", port)).await,
            Err(ProbeFailure::Status(503))
        );

        let missing = HttpProbe::new("/missing");
        assert_eq!(
            missing.probe(&Backend::new("127.0.0.1", port)).await,
            Err(ProbeFailure::Status(404))
        );
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new("/health");
        let result = probe.probe(&Backend::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(ProbeFailure::Transport(_))));
    }
}
