//! # Databus Telemetry
//!
//! Logging for databus members.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use databus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::for_member("m1"))
//!         .expect("Failed to init telemetry");
//!     // Member code runs here; everything logged through `tracing`
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DATABUS_SERVICE_NAME` | `databus` | Service name in logs |
//! | `DATABUS_MEMBER_NAME` | unset | Member run by this process |
//! | `DATABUS_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `DATABUS_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `DATABUS_JSON_LOGS` | `false` | JSON lines instead of text |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("A global subscriber is already installed")]
    AlreadyInitialized,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;
    Ok(TelemetryGuard {
        service: config.full_service_name(),
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service: String,
}

impl TelemetryGuard {
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service, "Shutting down telemetry");
    }
}
