//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, ports valid)
//! - Detect duplicate backends
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BalancerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("backend {index} has an empty host")]
    EmptyHost { index: usize },

    #[error("backend {index} has port 0")]
    InvalidPort { index: usize },

    #[error("backend {0} is listed more than once")]
    DuplicateBackend(String),

    #[error("virtual_nodes must be greater than zero")]
    ZeroVirtualNodes,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("health_check.path must start with '/': {0}")]
    InvalidHealthPath(String),

    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen = HashSet::new();
    for (index, backend) in config.backends.iter().enumerate() {
        if backend.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost { index });
        }
        if backend.port == 0 {
            errors.push(ValidationError::InvalidPort { index });
        }
        let key = format!("{}:{}", backend.host, backend.port);
        if !seen.insert(key.clone()) {
            errors.push(ValidationError::DuplicateBackend(key));
        }
    }

    if config.virtual_nodes == 0 {
        errors.push(ValidationError::ZeroVirtualNodes);
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.interval_secs"));
    }
    if health.timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.timeout_secs"));
    }
    if !health.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(health.path.clone()));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroDuration("timeouts.request_secs"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
