//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build backend pool → Spawn health monitor → Listen
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C received → broadcast → server drains, health monitor exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
