//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every field has a default, so an empty file is a valid configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Active deployment profile; selects an entry of `modes`.
    pub mode: String,

    /// Per-profile settings keyed by mode name.
    pub modes: HashMap<String, ModeConfig>,

    /// Listener settings.
    pub listener: ListenerConfig,

    /// Restart and drain behaviour.
    pub lifecycle: LifecycleConfig,

    /// Request timeouts.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Host of the active profile, or empty when no profile applies.
    pub fn host(&self) -> &str {
        self.modes
            .get(&self.mode)
            .map(|m| m.host.as_str())
            .unwrap_or("")
    }

    /// Address to listen on: `<host>:<port>`, or `:<port>` without a host.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host(), self.listener.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.lifecycle.drain_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }
}

/// Settings of one deployment profile.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ModeConfig {
    /// Host part of the bind address (e.g. "127.0.0.1").
    pub host: String,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port appended to the profile host.
    pub port: u16,

    /// Maximum requests served concurrently.
    pub max_in_flight: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            max_in_flight: 10_000,
        }
    }
}

/// Restart and drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for in-flight requests during drain.
    pub drain_timeout_secs: u64,

    /// Refuse to start when the inherited descriptor names another address.
    pub strict_handoff: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
            strict_handoff: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed per request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 15 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_address_has_no_host() {
        let config = AppConfig::default();
        assert_eq!(config.listen_address(), ":8787");
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert!(config.lifecycle.strict_handoff);
    }

    #[test]
    fn mode_selects_host() {
        let config: AppConfig = toml::from_str(
            r#"
            mode = "test"

            [modes.dev]
            host = "127.0.0.1"

            [modes.test]
            host = "10.0.0.7"

            [listener]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_address(), "10.0.0.7:9000");
    }

    #[test]
    fn log_format_parses_lowercase() {
        let config: AppConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(toml::from_str::<AppConfig>("[observability]\nlog_format = \"xml\"").is_err());
    }
}
