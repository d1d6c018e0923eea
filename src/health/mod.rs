//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → one probe task per known backend (probe.rs)
//!     → ConsistentHashing::set_backend_health
//!     → ring repaired on healthy ↔ unhealthy transitions
//!
//! Dispatcher failures (load_balancer::pool):
//!     Proxied request fails
//!     → backend marked unhealthy
//!     → Strategy::register_backend removes its virtual nodes
//! ```
//!
//! # Design Decisions
//! - Probes run without the ring lock; only the transition takes it
//! - A transition happens only when the probe result differs from the flag
//! - Probe failures never reach the request path

pub mod active;
pub mod probe;

pub use active::HealthMonitor;
pub use probe::{HttpProbe, Probe, ProbeFailure};
