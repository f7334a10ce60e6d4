//! Account broker daemon
//!
//! Serves the service-broker HTTP API on top of [`acctbroker_core::Broker`],
//! with configuration from a KDL file and environment overrides.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

pub use api::{ApiFailure, AppState, AsyncQuery, ErrorBody, build_router};
pub use auth::{Credentials, require_basic_auth};
pub use config::{BrokerConfig, ServerConfig, database_path_from_url, find_config_file};
pub use error::{ConfigError, Result};

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,acctbrokerd=debug,acctbroker_core=debug";

/// Install the global tracing subscriber, logging to stderr
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
