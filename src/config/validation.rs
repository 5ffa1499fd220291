//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that the active mode names a defined profile
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: &AppConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("lifecycle.drain_timeout_secs must be greater than zero")]
    ZeroDrainTimeout,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("listener.max_in_flight must be greater than zero")]
    ZeroMaxInFlight,

    #[error("mode {0:?} has no [modes.{0}] profile")]
    UnknownMode(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.lifecycle.drain_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDrainTimeout);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.listener.max_in_flight == 0 {
        errors.push(ValidationError::ZeroMaxInFlight);
    }
    if !config.mode.is_empty() && !config.modes.contains_key(&config.mode) {
        errors.push(ValidationError::UnknownMode(config.mode.clone()));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
