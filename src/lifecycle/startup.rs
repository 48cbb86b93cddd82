//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the record store and bootstrap its schema
//! - Start the metrics exporter when enabled
//! - Build the API server, bind the listener, serve until a signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ApiConfig, DatabaseConfig};
use crate::http::ApiServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::routing::RegistryError;
use crate::store::{schema, Store, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("record store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("endpoint registry rejected: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid metrics address '{address}': {source}")]
    MetricsAddress {
        address: String,
        source: AddrParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open the configured database and make sure every table exists.
pub fn open_store(config: &DatabaseConfig) -> Result<Store, StoreError> {
    let store = Store::open(&config.path)?;
    schema::bootstrap(&store)?;
    Ok(store)
}

/// Run the API server until SIGINT or SIGTERM.
pub async fn serve(config: ApiConfig) -> Result<(), StartupError> {
    let store = open_store(&config.database)?;

    if config.observability.metrics_enabled {
        let address = &config.observability.metrics_address;
        let addr: SocketAddr = address.parse().map_err(|source| StartupError::MetricsAddress {
            address: address.clone(),
            source,
        })?;
        metrics::init_metrics(addr);
    }

    let server = ApiServer::new(&config, store)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.trigger_on(signals::wait_for_shutdown());

    server.run(listener, receiver).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BoundValues;

    #[test]
    fn test_open_store_bootstraps_schema() {
        let store = open_store(&DatabaseConfig {
            path: ":memory:".to_string(),
        })
        .unwrap();
        let airports = store
            .with_session(|s| s.count("SELECT COUNT(*) FROM airports", &BoundValues::new()))
            .unwrap();
        assert_eq!(airports, 0);
    }
}
