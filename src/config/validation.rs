//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities and timeouts nonzero, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use crate::config::schema::GateConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "session.buffer_capacity").
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(err(
            "listener.bind_address",
            format!("not a valid socket address: {}", config.listener.bind_address),
        ));
    }
    if config.listener.max_sessions == 0 {
        errors.push(err("listener.max_sessions", "must be at least 1"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(err("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(err("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.session.buffer_capacity == 0 {
        errors.push(err("session.buffer_capacity", "must be at least 1 byte"));
    }
    if config.session.queue_capacity == 0 {
        errors.push(err("session.queue_capacity", "must be at least 1 item"));
    }
    if config.session.idle_timeout_secs == 0 {
        errors.push(err("session.idle_timeout_secs", "must be nonzero"));
    }
    if config.session.io_timeout_secs == 0 {
        errors.push(err("session.io_timeout_secs", "must be nonzero"));
    }

    if config.sweep.enabled && config.sweep.interval_secs == 0 {
        errors.push(err("sweep.interval_secs", "must be nonzero when the sweep is enabled"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(err(
            "observability.metrics_address",
            format!("not a valid socket address: {}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
