//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the statistics API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Public addressing of the API (host, root, error exposure).
    pub api: ApiSettings,

    /// Record store location.
    pub database: DatabaseConfig,

    /// Collection windowing defaults.
    pub pagination: PaginationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// How the API presents itself to clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Scheme and authority prepended to every emitted link.
    pub public_host: String,

    /// Path prefix the router is mounted under (empty for the site root).
    pub root: String,

    /// Include the store's error message and code in 500 responses.
    pub expose_backend_errors: bool,

    /// Directory served for paths outside the API root.
    pub static_dir: Option<String>,
}

impl ApiSettings {
    /// The prefix applied during link globalization.
    pub fn link_prefix(&self) -> String {
        format!("{}{}", self.public_host.trim_end_matches('/'), self.root)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            public_host: "http://localhost:8000".to_string(),
            root: "/api".to_string(),
            expose_backend_errors: true,
            static_dir: None,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or ":memory:".
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "flight_stats.sqlite".to_string(),
        }
    }
}

/// Pagination limits shared by every collection endpoint.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size when the client gives none.
    pub default_limit: u32,

    /// Hard cap on the page size.
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::pagination::DEFAULT_LIMIT,
            max_limit: crate::pagination::MAX_LIMIT,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty or JSON log lines.
    pub log_format: LogFormat,

    /// Record each resolved request in the `user_requests` table.
    pub request_log_enabled: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            request_log_enabled: true,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ApiConfig = toml::from_str(
            r#"
            [api]
            public_host = "https://flights.example.com"

            [pagination]
            max_limit = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.api.public_host, "https://flights.example.com");
        assert_eq!(config.api.root, "/api");
        assert_eq!(config.pagination.max_limit, 25);
        assert_eq!(config.pagination.default_limit, 10);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8000");
    }

    #[test]
    fn test_link_prefix() {
        let settings = ApiSettings::default();
        assert_eq!(settings.link_prefix(), "http://localhost:8000/api");
    }

    #[test]
    fn test_link_prefix_ignores_trailing_slash_on_host() {
        let settings = ApiSettings {
            public_host: "http://flights.example.org/".to_string(),
            ..ApiSettings::default()
        };
        assert_eq!(settings.link_prefix(), "http://flights.example.org/api");
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let config: ApiConfig = toml::from_str("[observability]\nlog_format = \"json\"\n").unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
