//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Strategies, health monitor, dispatcher produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging with backend identity as a field
//! - Metrics go through the `metrics` facade and are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
