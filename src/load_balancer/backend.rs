//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server by `(host, port)`
//! - Track health state (Healthy/Unhealthy)
//! - Count requests routed to the backend
//!
//! A backend is created once and shared as `Arc<Backend>`. Every structure that
//! refers to it (strategy lists, ring entries, probe tasks) holds the same
//! instance, so a health flip is visible everywhere at once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,

    healthy: AtomicBool,
    requests: AtomicU64,
}

impl Backend {
    /// Create a new backend. Backends start out healthy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            healthy: AtomicBool::new(true),
            requests: AtomicU64::new(0),
        }
    }

    /// Create a new shared backend.
    pub fn shared(host: impl Into<String>, port: u16) -> Arc<Self> {
        Arc::new(Self::new(host, port))
    }

    /// Identity of the backend, `host:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL used to reach the backend.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Two backends are the same logical backend when host and port match.
    pub fn same_endpoint(&self, other: &Backend) -> bool {
        self.host == other.host && self.port == other.port
    }

    // --- Health Logic ---

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Set the health flag, returning the previous value.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Record a request routed to this backend.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of requests routed to this backend so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An inbound request as seen by a selection strategy.
///
/// Only the identifier matters: it is the hashing input for consistent
/// hashing and is ignored by round robin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub id: String,
}

impl IncomingRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Collapse a backend list so that each `(host, port)` appears once.
///
/// The first occurrence wins; later duplicates are dropped.
pub fn dedup_backends(backends: Vec<Arc<Backend>>) -> Vec<Arc<Backend>> {
    let mut unique: Vec<Arc<Backend>> = Vec::with_capacity(backends.len());
    for backend in backends {
        if unique.iter().any(|b| b.same_endpoint(&backend)) {
            tracing::warn!(backend = %backend, "Duplicate backend ignored");
            continue;
        }
        unique.push(backend);
    }
    unique
}
