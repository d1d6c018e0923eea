//! Selection error definitions.

use thiserror::Error;

/// Errors produced by the selection strategies.
///
/// Only [`BalancerError::NoHealthyBackend`] is expected at request time; the
/// dispatcher turns it into `503 Service Unavailable`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalancerError {
    /// No backends were configured.
    #[error("no backends configured")]
    EmptyBackendSet,

    /// Every known backend is unhealthy (or the ring is empty).
    #[error("no healthy backend available")]
    NoHealthyBackend,

    /// A ring position without an owner, or an owner without a position.
    #[error("hash ring inconsistency at position {position}")]
    RingInconsistency { position: u32 },

    /// Strategy name not recognised.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Consistent hashing needs at least one virtual node per backend.
    #[error("virtual node count must be greater than zero")]
    InvalidVirtualNodes,
}
