use std::{net::SocketAddr, path::PathBuf, time::Duration};

use config::{Config, ConfigError};
use serde::Deserialize;

use crate::domain::rental::RetryPolicy;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct RentalsConfig {
    pub server: Server,
    pub store: Store,
    pub booking: Booking,
    pub id: IdNode,
    pub logger: Logger,
}

impl RentalsConfig {
    /// `rentals.toml` if present, overridden by `RENTALS_*` variables
    /// (`RENTALS_STORE__KIND=eventstore`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name("rentals").required(false))
            .add_source(
                config::Environment::with_prefix("RENTALS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<RentalsConfig>()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind", "0.0.0.0:8080")?
            .set_default("store.kind", "memory")?
            .set_default("store.eventstore_url", "esdb://localhost:2113?tls=false")?
            .set_default("booking.max_attempts", 3)?
            .set_default("booking.backoff_ms", 25)?
            .set_default("id.machine_id", 1)?
            .set_default("id.node_id", 1)?
            .set_default("logger.level", "INFO")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub bind: SocketAddr,
    pub tls: Option<Tls>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Store {
    pub kind: StoreKind,
    pub eventstore_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    EventStore,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Booking {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl From<&Booking> for RetryPolicy {
    fn from(value: &Booking) -> Self {
        RetryPolicy {
            max_attempts: value.max_attempts.max(1),
            backoff: Duration::from_millis(value.backoff_ms),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct IdNode {
    pub machine_id: i32,
    pub node_id: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let config = RentalsConfig::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<RentalsConfig>()
            .unwrap();
        assert_eq!(config.server.bind.port(), 8080);
        assert!(config.server.tls.is_none());
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(
            RetryPolicy::from(&config.booking),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(25),
            }
        );
        assert_eq!(tracing::Level::from(&config.logger.level), tracing::Level::INFO);
    }

    #[test]
    fn test_overrides() {
        let config = RentalsConfig::builder()
            .unwrap()
            .set_override("store.kind", "eventstore")
            .unwrap()
            .set_override("booking.max_attempts", 0)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<RentalsConfig>()
            .unwrap();
        assert_eq!(config.store.kind, StoreKind::EventStore);
        assert_eq!(RetryPolicy::from(&config.booking).max_attempts, 1);
    }
}
