//! Backend pool management.
//!
//! # Responsibilities
//! - Build the shared backend instances from configuration
//! - Own the selection strategy used by the dispatcher
//! - Route out-of-band failure reports into ring repair
//! - Hand out a health monitor when the strategy supports one

use std::sync::Arc;

use crate::config::{BackendConfig, BalancerConfig, HealthCheckConfig, ValidationError};
use crate::health::{active::HealthMonitor, probe::Probe};
use crate::load_balancer::{
    backend::{Backend, IncomingRequest},
    BalancerError, ConsistentHashing, RoundRobin, Strategy, StrategyKind,
};

/// Backends plus the strategy that selects among them.
#[derive(Debug, Clone)]
pub struct BackendPool {
    strategy: Arc<dyn Strategy>,
    /// Same instance as `strategy` when consistent hashing is in use.
    ring: Option<Arc<ConsistentHashing>>,
}

impl BackendPool {
    /// Create a pool over `backends`.
    pub fn new(
        kind: StrategyKind,
        backends: Vec<Arc<Backend>>,
        vnodes: usize,
    ) -> Result<Self, BalancerError> {
        let pool = match kind {
            StrategyKind::RoundRobin => Self {
                strategy: Arc::new(RoundRobin::new(backends)?),
                ring: None,
            },
            StrategyKind::ConsistentHashing => {
                let ring = Arc::new(ConsistentHashing::new(backends, vnodes)?);
                Self {
                    strategy: ring.clone(),
                    ring: Some(ring),
                }
            }
        };
        tracing::info!(
            strategy = %kind,
            backends = pool.strategy.backends().len(),
            "Backend pool initialized"
        );
        Ok(pool)
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &BalancerConfig) -> Result<Self, BalancerError> {
        let backends = config.backends.iter().map(BackendConfig::to_backend).collect();
        Self::new(config.strategy, backends, config.virtual_nodes)
    }

    /// Give up the pool, keeping only the strategy.
    pub fn into_strategy(self) -> Arc<dyn Strategy> {
        self.strategy
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Select a backend for the request.
    pub fn get(&self, request: &IncomingRequest) -> Result<Arc<Backend>, BalancerError> {
        self.strategy.select_backend(request)
    }

    /// A request to `backend` failed: mark it down and let the strategy repair.
    pub fn report_failure(&self, backend: &Arc<Backend>) {
        if backend.set_healthy(false) {
            tracing::warn!(backend = %backend, "Backend failed a proxied request, marking unhealthy");
        }
        self.strategy.register_backend(backend.clone());
    }

    /// Return a list of all backends (for health checking).
    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.strategy.backends()
    }

    pub fn describe_topology(&self) -> String {
        self.strategy.describe_topology()
    }

    /// Health monitor for this pool, if the strategy is health-driven.
    ///
    /// Round robin has no health awareness and gets `Ok(None)`.
    pub fn health_monitor<P: Probe>(
        &self,
        probe: P,
        config: HealthCheckConfig,
    ) -> Result<Option<HealthMonitor<P>>, ValidationError> {
        self.ring
            .as_ref()
            .map(|ring| HealthMonitor::new(ring.clone(), probe, config))
            .transpose()
    }
}
