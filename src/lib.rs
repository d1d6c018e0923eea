//! Dynamic load balancer library.
//!
//! Routes requests to one of several backends under a pluggable selection
//! strategy (round robin or consistent hashing with virtual nodes) and keeps
//! the consistent hash ring in line with backend health through periodic
//! probing.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::BalancerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{new_strategy, Backend, BalancerError, IncomingRequest, Strategy, StrategyKind};
