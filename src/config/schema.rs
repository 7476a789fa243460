//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the session
//! gateway. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

/// Root configuration for the session gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, TLS, session ceiling).
    pub listener: ListenerConfig,

    /// Per-session buffer, queue, and timeout settings.
    pub session: SessionConfig,

    /// Idle-session sweep settings.
    pub sweep: SweepConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent sessions. New connections beyond this are refused.
    pub max_sessions: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            tls: None,
            max_sessions: 1000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Per-session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity in bytes of each staging buffer (one per direction).
    pub buffer_capacity: usize,

    /// Capacity in items of the inbound message queue.
    pub queue_capacity: usize,

    /// Seconds without activity before a session is considered idle.
    pub idle_timeout_secs: u64,

    /// Bound in seconds on any single transport read or write.
    pub io_timeout_secs: u64,

    /// Bound in seconds on worker join during stop; workers still running
    /// after this are aborted.
    pub stop_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 8192,
            queue_capacity: 100,
            idle_timeout_secs: 3600,
            io_timeout_secs: 30,
            stop_timeout_secs: 5,
        }
    }
}

impl SessionConfig {
    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    /// Per-call I/O bound as a `Duration`.
    pub fn io_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.io_timeout_secs)
    }

    /// Worker-join bound as a `Duration`.
    pub fn stop_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Idle-session sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Enable the periodic sweep task.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Address the metrics endpoint binds to.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "wiregate=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9301".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = GateConfig::default();
        assert_eq!(config.session.buffer_capacity, 8192);
        assert_eq!(config.session.queue_capacity, 100);
        assert_eq!(config.session.idle_timeout_secs, 3600);
        assert_eq!(config.listener.max_sessions, 1000);
        assert!(config.listener.tls.is_none());
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.listener.max_sessions, 1000);
        assert_eq!(config.session.queue_capacity, 100);
    }

    #[test]
    fn tls_section_parses() {
        let config: GateConfig = toml::from_str(
            r#"
            [listener.tls]
            cert_path = "/etc/wiregate/cert.pem"
            key_path = "/etc/wiregate/key.pem"
            "#,
        )
        .unwrap();
        let tls = config.listener.tls.unwrap();
        assert_eq!(tls.cert_path, "/etc/wiregate/cert.pem");
    }
}
