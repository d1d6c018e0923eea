//! Consistent hashing strategy with virtual nodes.
//!
//! Each backend is placed on a 32-bit ring `vnodes` times, at
//! `xxh32("host:port-i")` for `i` in `0..vnodes`. A request is hashed onto the
//! same ring and served by the first healthy backend found walking clockwise
//! from the first position `>=` its hash, wrapping to the start of the ring.
//!
//! # Invariants
//! - `positions` is sorted ascending and holds no duplicates
//! - every position has exactly one owner in `owners`, and vice versa
//! - all ring entries of a backend alias the same `Arc<Backend>`
//!
//! Ring membership follows the health flag: unhealthy backends have their
//! virtual nodes removed, returning backends get them back.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard};

use twox_hash::XxHash32;

use crate::load_balancer::{
    backend::{dedup_backends, Backend, IncomingRequest},
    BalancerError, Strategy, StrategyKind,
};
use crate::observability::metrics;

const HASH_SEED: u32 = 0;

/// Hash a key onto the ring.
pub fn ring_hash(key: &str) -> u32 {
    let mut hasher = XxHash32::with_seed(HASH_SEED);
    hasher.write(key.as_bytes());
    hasher.finish() as u32
}

/// Ring positions a backend occupies with `vnodes` virtual nodes.
pub fn virtual_node_positions(backend: &Backend, vnodes: usize) -> impl Iterator<Item = u32> + '_ {
    let key = backend.key();
    (0..vnodes).map(move |i| ring_hash(&format!("{}-{}", key, i)))
}

/// Sorted ring of positions with their owning backends.
#[derive(Debug, Default, Clone)]
pub struct HashRing {
    positions: Vec<u32>,
    owners: HashMap<u32, Arc<Backend>>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sorted ring positions.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn owner(&self, position: u32) -> Option<&Arc<Backend>> {
        self.owners.get(&position)
    }

    /// Place `backend` at `position`.
    ///
    /// An occupied position changes owner (last write wins) but is never
    /// duplicated. Returns true if the position is new to the ring.
    pub fn insert(&mut self, position: u32, backend: Arc<Backend>) -> bool {
        if let Some(previous) = self.owners.insert(position, backend.clone()) {
            if !previous.same_endpoint(&backend) {
                tracing::debug!(
                    position,
                    previous = %previous,
                    backend = %backend,
                    "Virtual node collision, position reassigned"
                );
            }
            return false;
        }
        if let Err(index) = self.positions.binary_search(&position) {
            self.positions.insert(index, position);
        }
        true
    }

    /// Remove `position` if it is owned by `backend`. Returns true if removed.
    pub fn remove_owned(&mut self, position: u32, backend: &Backend) -> bool {
        match self.owners.get(&position) {
            Some(owner) if owner.same_endpoint(backend) => {}
            _ => return false,
        }
        self.owners.remove(&position);
        if let Ok(index) = self.positions.binary_search(&position) {
            self.positions.remove(index);
        }
        true
    }

    /// Place all virtual nodes of `backend`. Returns the number of new positions.
    pub fn add(&mut self, backend: &Arc<Backend>, vnodes: usize) -> usize {
        virtual_node_positions(backend, vnodes)
            .filter(|&position| self.insert(position, backend.clone()))
            .count()
    }

    /// Remove all virtual nodes of `backend`. Returns the number of removed positions.
    pub fn remove(&mut self, backend: &Backend, vnodes: usize) -> usize {
        virtual_node_positions(backend, vnodes)
            .filter(|&position| self.remove_owned(position, backend))
            .count()
    }

    /// Index of the first position `>= hash`, wrapping to 0 past the end.
    pub fn lookup_index(&self, hash: u32) -> Option<usize> {
        if self.positions.is_empty() {
            return None;
        }
        let index = self.positions.partition_point(|&p| p < hash);
        Some(if index == self.positions.len() { 0 } else { index })
    }

    /// First healthy backend clockwise from `hash`.
    ///
    /// Visits each position at most once, so an all-unhealthy ring terminates
    /// with `None`.
    pub fn select(&self, hash: u32) -> Option<Arc<Backend>> {
        let start = self.lookup_index(hash)?;
        let len = self.positions.len();

        for offset in 0..len {
            let position = self.positions[(start + offset) % len];
            match self.owners.get(&position) {
                Some(backend) if backend.is_healthy() => return Some(backend.clone()),
                Some(_) => {}
                None => tracing::error!(position, "Ring position without owner"),
            }
        }
        None
    }

    /// Positions currently owned by `backend`, ascending.
    pub fn positions_of(&self, backend: &Backend) -> Vec<u32> {
        self.positions
            .iter()
            .copied()
            .filter(|p| self.owners.get(p).is_some_and(|owner| owner.same_endpoint(backend)))
            .collect()
    }

    /// Verify the position list and owner map describe the same ring.
    pub fn check_consistency(&self) -> Result<(), BalancerError> {
        if let Some(window) = self.positions.windows(2).find(|w| w[0] >= w[1]) {
            return Err(BalancerError::RingInconsistency { position: window[1] });
        }
        if let Some(&position) = self.positions.iter().find(|p| !self.owners.contains_key(*p)) {
            return Err(BalancerError::RingInconsistency { position });
        }
        if self.owners.len() != self.positions.len() {
            let position = self
                .owners
                .keys()
                .copied()
                .find(|p| self.positions.binary_search(p).is_err())
                .unwrap_or_default();
            return Err(BalancerError::RingInconsistency { position });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RingState {
    ring: HashRing,
    /// Every known backend by key, on the ring or not.
    members: BTreeMap<String, Arc<Backend>>,
}

/// Consistent hashing selector.
#[derive(Debug)]
pub struct ConsistentHashing {
    state: Mutex<RingState>,
    vnodes: usize,
}

impl ConsistentHashing {
    /// Create a ring over `backends` with `vnodes` virtual nodes each.
    pub fn new(backends: Vec<Arc<Backend>>, vnodes: usize) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::EmptyBackendSet);
        }
        if vnodes == 0 {
            return Err(BalancerError::InvalidVirtualNodes);
        }
        let strategy = Self {
            state: Mutex::new(RingState::default()),
            vnodes,
        };
        strategy.initialize(backends);
        Ok(strategy)
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().expect("hash ring mutex poisoned")
    }

    fn after_mutation(ring: &HashRing) {
        debug_assert_eq!(ring.check_consistency(), Ok(()));
        metrics::record_ring_size(ring.len());
    }

    /// Place the virtual nodes of `backend` on the ring. Idempotent.
    pub fn add_backend(&self, backend: &Arc<Backend>) {
        let mut state = self.lock();
        state
            .members
            .entry(backend.key())
            .or_insert_with(|| backend.clone());
        let added = state.ring.add(backend, self.vnodes);
        Self::after_mutation(&state.ring);
        if added > 0 {
            tracing::info!(backend = %backend, positions = added, ring_size = state.ring.len(), "Backend added to ring");
        }
    }

    /// Remove the virtual nodes of `backend` from the ring.
    ///
    /// The backend stays known to the health monitor. Removing a backend that
    /// is not on the ring is a no-op.
    pub fn remove_backend(&self, backend: &Backend) {
        let mut state = self.lock();
        let removed = state.ring.remove(backend, self.vnodes);
        Self::after_mutation(&state.ring);
        if removed > 0 {
            tracing::info!(backend = %backend, positions = removed, ring_size = state.ring.len(), "Backend removed from ring");
        }
    }

    /// Flip the health flag of `backend` and repair the ring to match.
    ///
    /// Returns true if the flag changed. Flag and ring are updated under the
    /// same lock, so selections never see one without the other.
    pub fn set_backend_health(&self, backend: &Arc<Backend>, healthy: bool) -> bool {
        let mut state = self.lock();
        if backend.set_healthy(healthy) == healthy {
            return false;
        }

        if healthy {
            let added = state.ring.add(backend, self.vnodes);
            tracing::info!(backend = %backend, positions = added, "Backend is back online");
        } else {
            let removed = state.ring.remove(backend, self.vnodes);
            tracing::warn!(backend = %backend, positions = removed, "Backend is marked as down");
        }
        Self::after_mutation(&state.ring);
        metrics::record_backend_health(&backend.key(), healthy);
        true
    }

    /// True if any ring position is owned by `backend`.
    pub fn contains(&self, backend: &Backend) -> bool {
        !self.positions_of(backend).is_empty()
    }

    pub fn positions_of(&self, backend: &Backend) -> Vec<u32> {
        self.lock().ring.positions_of(backend)
    }

    pub fn ring_len(&self) -> usize {
        self.lock().ring.len()
    }

    /// Copy of the current ring.
    pub fn snapshot(&self) -> HashRing {
        self.lock().ring.clone()
    }
}

impl Strategy for ConsistentHashing {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ConsistentHashing
    }

    fn initialize(&self, backends: Vec<Arc<Backend>>) {
        let mut state = self.lock();
        state.ring = HashRing::new();
        state.members.clear();

        for backend in dedup_backends(backends) {
            if backend.is_healthy() {
                state.ring.add(&backend, self.vnodes);
            }
            state.members.insert(backend.key(), backend);
        }
        Self::after_mutation(&state.ring);
        tracing::info!(
            backends = state.members.len(),
            vnodes = self.vnodes,
            ring_size = state.ring.len(),
            "Consistent hash ring built"
        );
    }

    fn select_backend(&self, request: &IncomingRequest) -> Result<Arc<Backend>, BalancerError> {
        let hash = ring_hash(&request.id);
        let selected = self.lock().ring.select(hash);
        match selected {
            Some(backend) => {
                backend.record_request();
                Ok(backend)
            }
            None => {
                tracing::warn!(request = %request.id, "No healthy backends found on the ring");
                Err(BalancerError::NoHealthyBackend)
            }
        }
    }

    /// Record `backend` as known and reconcile its ring presence with its
    /// health flag: healthy backends are (re-)added, unhealthy ones removed.
    fn register_backend(&self, backend: Arc<Backend>) {
        let mut state = self.lock();
        let member = state
            .members
            .entry(backend.key())
            .or_insert_with(|| backend.clone())
            .clone();
        if !Arc::ptr_eq(&member, &backend) {
            member.set_healthy(backend.is_healthy());
        }

        if member.is_healthy() {
            let added = state.ring.add(&member, self.vnodes);
            tracing::debug!(backend = %member, positions = added, "Registered healthy backend");
        } else {
            let removed = state.ring.remove(&member, self.vnodes);
            tracing::warn!(backend = %member, positions = removed, "Registered unhealthy backend, removed from ring");
        }
        Self::after_mutation(&state.ring);
        metrics::record_backend_health(&member.key(), member.is_healthy());
    }

    fn describe_topology(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Consistent hash ring: {} positions, {} backends, {} vnodes each",
            state.ring.len(),
            state.members.len(),
            self.vnodes
        );
        for &position in state.ring.positions() {
            if let Some(backend) = state.ring.owner(position) {
                let health = if backend.is_healthy() { "healthy" } else { "unhealthy" };
                let _ = writeln!(out, "{:>10} -> {} ({})", position, backend, health);
            }
        }
        out
    }

    fn backends(&self) -> Vec<Arc<Backend>> {
        self.lock().members.values().cloned().collect()
    }
}
