//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Member this process runs, if any
    pub member_name: Option<String>,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "databus".to_string(),
            member_name: None,
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABUS_SERVICE_NAME`: Service name (default: databus)
    /// - `DATABUS_MEMBER_NAME`: Member name (default: unset)
    /// - `DATABUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `DATABUS_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `DATABUS_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("DATABUS_SERVICE_NAME").unwrap_or(defaults.service_name),

            member_name: lookup("DATABUS_MEMBER_NAME").filter(|n| !n.trim().is_empty()),

            log_level: lookup("DATABUS_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: lookup("DATABUS_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),

            json_logs: lookup("DATABUS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a process running one member.
    pub fn for_member(member_name: &str) -> Self {
        let mut config = Self::from_env();
        config.member_name = Some(member_name.to_string());
        config
    }

    /// Service name including the member, if set.
    pub fn full_service_name(&self) -> String {
        match &self.member_name {
            Some(member) => format!("{}-{}", self.service_name, member),
            None => self.service_name.clone(),
        }
    }
}
