//! Round-robin load balancing strategy.
//!
//! Health-unaware: an unhealthy backend is still returned in turn. Callers
//! that need health-aware rotation filter the list before handing it over.

use std::fmt::Write;
use std::sync::{Arc, Mutex};

use crate::load_balancer::{
    backend::{dedup_backends, Backend, IncomingRequest},
    BalancerError, Strategy, StrategyKind,
};

#[derive(Debug, Default)]
struct RoundRobinState {
    backends: Vec<Arc<Backend>>,
    /// Always `< backends.len()` when the list is non-empty.
    cursor: usize,
}

/// Round-robin selector.
/// Stores a cursor into the backend list and advances it on every selection.
#[derive(Debug, Default)]
pub struct RoundRobin {
    state: Mutex<RoundRobinState>,
}

impl RoundRobin {
    /// Create a selector over `backends`. Fails on an empty list.
    pub fn new(backends: Vec<Arc<Backend>>) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::EmptyBackendSet);
        }
        let rr = Self::default();
        rr.initialize(backends);
        Ok(rr)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoundRobinState> {
        self.state.lock().expect("round robin mutex poisoned")
    }
}

impl Strategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn initialize(&self, backends: Vec<Arc<Backend>>) {
        let mut state = self.lock();
        state.backends = dedup_backends(backends);
        state.cursor = 0;
    }

    fn select_backend(&self, _request: &IncomingRequest) -> Result<Arc<Backend>, BalancerError> {
        let mut state = self.lock();
        let len = state.backends.len();
        if len == 0 {
            return Err(BalancerError::EmptyBackendSet);
        }

        state.cursor = (state.cursor + 1) % len;
        let backend = state.backends[state.cursor].clone();
        backend.record_request();
        Ok(backend)
    }

    fn register_backend(&self, backend: Arc<Backend>) {
        let mut state = self.lock();
        if state.backends.iter().any(|b| b.same_endpoint(&backend)) {
            tracing::debug!(backend = %backend, "Backend already registered");
            return;
        }
        tracing::info!(backend = %backend, "Registering backend");
        state.backends.push(backend);
    }

    fn describe_topology(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        for (index, backend) in state.backends.iter().enumerate() {
            let _ = writeln!(out, "[{}] {}", index, backend);
        }
        out
    }

    fn backends(&self) -> Vec<Arc<Backend>> {
        self.lock().backends.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn backends(n: u16) -> Vec<Arc<Backend>> {
        (0..n).map(|i| Backend::shared("127.0.0.1", 8080 + i)).collect()
    }

    fn req() -> IncomingRequest {
        IncomingRequest::new("/")
    }

    #[test]
    fn test_round_robin() {
        let b = backends(2);
        let lb = RoundRobin::new(b.clone()).unwrap();

        // Cursor advances before the read.
        let s1 = lb.select_backend(&req()).unwrap();
        assert_eq!(s1.port, b[1].port);

        let s2 = lb.select_backend(&req()).unwrap();
        assert_eq!(s2.port, b[0].port);

        let s3 = lb.select_backend(&req()).unwrap();
        assert_eq!(s3.port, b[1].port);
    }

    #[test]
    fn test_every_window_visits_all_backends() {
        for n in 1..=7 {
            let lb = RoundRobin::new(backends(n)).unwrap();
            let picks: Vec<u16> = (0..(n as usize * 4))
                .map(|_| lb.select_backend(&req()).unwrap().port)
                .collect();

            for window in picks.windows(n as usize) {
                let seen: HashSet<u16> = window.iter().copied().collect();
                assert_eq!(seen.len(), n as usize);
            }
            // Fixed cyclic permutation.
            for (i, port) in picks.iter().enumerate().skip(n as usize) {
                assert_eq!(*port, picks[i - n as usize]);
            }
        }
    }

    #[test]
    fn test_empty_backend_set() {
        assert_eq!(RoundRobin::new(Vec::new()).unwrap_err(), BalancerError::EmptyBackendSet);

        let lb = RoundRobin::default();
        assert_eq!(lb.select_backend(&req()).unwrap_err(), BalancerError::EmptyBackendSet);
    }

    #[test]
    fn test_ignores_health() {
        let b = backends(1);
        b[0].set_healthy(false);
        let lb = RoundRobin::new(b.clone()).unwrap();
        assert!(Arc::ptr_eq(&lb.select_backend(&req()).unwrap(), &b[0]));
    }

    #[test]
    fn test_register_appends_once() {
        let lb = RoundRobin::new(backends(2)).unwrap();
        lb.select_backend(&req()).unwrap();

        let extra = Backend::shared("127.0.0.1", 9999);
        lb.register_backend(extra.clone());
        lb.register_backend(Backend::shared("127.0.0.1", 9999));
        assert_eq!(lb.backends().len(), 3);

        // Cursor was at 1; the new backend sits at index 2.
        assert!(Arc::ptr_eq(&lb.select_backend(&req()).unwrap(), &extra));
    }

    #[test]
    fn test_initialize_replaces_state() {
        let lb = RoundRobin::new(backends(3)).unwrap();
        lb.select_backend(&req()).unwrap();

        let fresh = vec![Backend::shared("10.0.0.1", 80), Backend::shared("10.0.0.2", 80)];
        lb.initialize(fresh.clone());
        lb.initialize(fresh.clone());
        assert_eq!(lb.backends().len(), 2);
        assert!(Arc::ptr_eq(&lb.select_backend(&req()).unwrap(), &fresh[1]));
    }

    #[test]
    fn test_counts_requests_and_describes() {
        let b = backends(2);
        let lb = RoundRobin::new(b.clone()).unwrap();
        for _ in 0..4 {
            lb.select_backend(&req()).unwrap();
        }
        assert_eq!(b[0].request_count(), 2);
        assert_eq!(b[1].request_count(), 2);

        let topology = lb.describe_topology();
        assert_eq!(topology, "[0] 127.0.0.1:8080\n[1] 127.0.0.1:8081\n");
    }
}
