//! HTTP dispatcher.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum router, trace + timeout layers)
//!     → /health, /topology, /backends answered locally
//!     → everything else: IncomingRequest { id: uri }
//!         → BackendPool::get (strategy selection)
//!         → forward to http://host:port{uri}
//!         → on failure: mark backend down, ring repair, 503
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
