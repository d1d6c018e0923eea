//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request → IncomingRequest { id: uri }
//!     → Strategy::select_backend
//!         - round_robin.rs (rotate through backends)
//!         - consistent_hash.rs (hash ring lookup, clockwise scan for health)
//!     → Arc<Backend> or BalancerError::NoHealthyBackend
//!
//! Health monitor / dispatcher failure
//!     → Backend health flag flipped
//!     → ring repaired (virtual nodes removed or re-added)
//! ```
//!
//! # Design Decisions
//! - Strategies are shared as `Arc<dyn Strategy>`; all methods take `&self`
//! - Ring reads and writes are serialized by one mutex per strategy
//! - Selection never performs network I/O

pub mod backend;
pub mod consistent_hash;
pub mod error;
pub mod pool;
pub mod round_robin;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use backend::{Backend, IncomingRequest};
pub use consistent_hash::ConsistentHashing;
pub use error::BalancerError;
pub use pool::BackendPool;
pub use round_robin::RoundRobin;

/// Virtual nodes placed on the ring per backend unless configured otherwise.
pub const DEFAULT_VIRTUAL_NODES: usize = 100;

/// Pluggable backend selection policy.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Which policy this is.
    fn kind(&self) -> StrategyKind;

    /// Rebuild internal state from `backends`, discarding prior state.
    fn initialize(&self, backends: Vec<Arc<Backend>>);

    /// Pick a backend for `request`. Never blocks on I/O.
    fn select_backend(&self, request: &IncomingRequest) -> Result<Arc<Backend>, BalancerError>;

    /// Incorporate a new or returning backend.
    fn register_backend(&self, backend: Arc<Backend>);

    /// Human readable snapshot of the current distribution.
    fn describe_topology(&self) -> String;

    /// Every backend the strategy knows about, healthy or not.
    fn backends(&self) -> Vec<Arc<Backend>>;
}

/// Available selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    #[serde(alias = "consistent")]
    ConsistentHashing,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::ConsistentHashing => "consistent-hashing",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" | "rr" => Ok(StrategyKind::RoundRobin),
            "consistent-hashing" | "consistent" => Ok(StrategyKind::ConsistentHashing),
            other => Err(BalancerError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Build a strategy of the given kind over a static backend list.
///
/// `vnodes` is only used by consistent hashing.
pub fn new_strategy(
    kind: StrategyKind,
    backends: Vec<Arc<Backend>>,
    vnodes: usize,
) -> Result<Arc<dyn Strategy>, BalancerError> {
    BackendPool::new(kind, backends, vnodes).map(BackendPool::into_strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_kind() {
        assert_eq!("round-robin".parse::<StrategyKind>().unwrap(), StrategyKind::RoundRobin);
        assert_eq!("consistent".parse::<StrategyKind>().unwrap(), StrategyKind::ConsistentHashing);
        assert_eq!(
            "Consistent-Hashing".parse::<StrategyKind>().unwrap(),
            StrategyKind::ConsistentHashing
        );
        assert_eq!(
            "random".parse::<StrategyKind>(),
            Err(BalancerError::UnknownStrategy("random".into()))
        );
    }

    #[test]
    fn test_new_strategy_rejects_empty_backends() {
        for kind in [StrategyKind::RoundRobin, StrategyKind::ConsistentHashing] {
            let err = new_strategy(kind, Vec::new(), DEFAULT_VIRTUAL_NODES).unwrap_err();
            assert_eq!(err, BalancerError::EmptyBackendSet);
        }
    }

    #[test]
    fn test_new_strategy_kinds() {
        let backends = vec![Backend::shared("127.0.0.1", 8081), Backend::shared("127.0.0.1", 8082)];

        let rr = new_strategy(StrategyKind::RoundRobin, backends.clone(), DEFAULT_VIRTUAL_NODES).unwrap();
        assert_eq!(rr.kind(), StrategyKind::RoundRobin);
        assert_eq!(rr.backends().len(), 2);

        let ch = new_strategy(StrategyKind::ConsistentHashing, backends, 10).unwrap();
        assert_eq!(ch.kind(), StrategyKind::ConsistentHashing);
        assert_eq!(ch.backends().len(), 2);
        assert!(ch.select_backend(&IncomingRequest::new("/")).is_ok());
    }
}
