//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend known to the ring
//! - Flip health flags and repair the ring on transitions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};

use crate::config::{HealthCheckConfig, ValidationError};
use crate::health::probe::{Probe, ProbeFailure};
use crate::load_balancer::{ConsistentHashing, Strategy};

pub struct HealthMonitor<P> {
    strategy: Arc<ConsistentHashing>,
    probe: Arc<P>,
    config: HealthCheckConfig,
}

impl<P: Probe> HealthMonitor<P> {
    /// Fails if the check interval is zero, which the ticker cannot run with.
    pub fn new(
        strategy: Arc<ConsistentHashing>,
        probe: P,
        config: HealthCheckConfig,
    ) -> Result<Self, ValidationError> {
        if config.interval_secs == 0 {
            return Err(ValidationError::ZeroDuration("health_check.interval_secs"));
        }
        Ok(Self {
            strategy,
            probe: Arc::new(probe),
            config,
        })
    }

    /// Run the monitor on a background task until `shutdown` fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first cycle runs one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every known backend once, concurrently.
    ///
    /// Returns the number of health transitions applied.
    pub async fn check_all(&self) -> usize {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut probes = JoinSet::new();

        for backend in self.strategy.backends() {
            let probe = self.probe.clone();
            let strategy = self.strategy.clone();

            probes.spawn(async move {
                let result = match time::timeout(timeout, probe.probe(&backend)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeFailure::Timeout(timeout.as_millis())),
                };

                let healthy = match result {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(backend = %backend, error = %e, "Health check failed");
                        false
                    }
                };

                strategy.set_backend_health(&backend, healthy)
            });
        }

        let mut transitions = 0;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(true) => transitions += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Health probe task failed"),
            }
        }

        if transitions > 0 {
            tracing::info!(
                transitions,
                ring_size = self.strategy.ring_len(),
                "Health check cycle changed ring membership"
            );
        }
        transitions
    }
}
