//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use sm_post_query::projection::ConsumerConfig;

use crate::error::AppError;

/// Which broker carries the event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// In-process partitioned broker.
    Memory,
    /// Kafka, through the `kafka` feature.
    Kafka,
}

impl FromStr for BrokerKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "kafka" => Ok(Self::Kafka),
            other => Err(AppError::Config(format!(
                "BROKER must be `memory` or `kafka`, got `{other}`"
            ))),
        }
    }
}

/// Settings for the API server, the projector and the outbox relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// `PostgreSQL` URL. In-memory stores are used when absent.
    pub database_url: Option<String>,
    /// Pool size for the database.
    pub database_max_connections: u32,
    /// Topic the event store publishes to.
    pub event_topic: String,
    /// Broker implementation.
    pub broker: BrokerKind,
    /// Partitions per topic of the in-memory broker.
    pub broker_partitions: usize,
    /// Kafka bootstrap servers.
    pub kafka_bootstrap_servers: Option<String>,
    /// Consumer group of the projector.
    pub consumer_group_id: String,
    /// Projector consumer loop tuning.
    pub projector: ConsumerConfig,
    /// How often the outbox relay republishes pending events.
    pub outbox_relay_interval: Duration,
    /// Outbox entries republished per relay pass.
    pub outbox_relay_batch_size: usize,
    /// OTLP collector endpoint. Spans are only exported when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            event_topic: "social-media-post-events".to_string(),
            broker: BrokerKind::Memory,
            broker_partitions: 4,
            kafka_bootstrap_servers: None,
            consumer_group_id: "sm-post-projector".to_string(),
            projector: ConsumerConfig::default(),
            outbox_relay_interval: Duration::from_secs(5),
            outbox_relay_batch_size: 100,
            otlp_endpoint: None,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for values that do not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for unset
    /// keys. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for values that do not parse, or when the
    /// Kafka broker is selected without bootstrap servers.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let projector = ConsumerConfig {
            poll_timeout: millis(&get, "PROJECTOR_POLL_TIMEOUT_MS", defaults.projector.poll_timeout)?,
            retry_min_delay: millis(
                &get,
                "PROJECTOR_RETRY_MIN_DELAY_MS",
                defaults.projector.retry_min_delay,
            )?,
            retry_max_delay: millis(
                &get,
                "PROJECTOR_RETRY_MAX_DELAY_MS",
                defaults.projector.retry_max_delay,
            )?,
            max_retries: parsed(&get, "PROJECTOR_MAX_RETRIES", defaults.projector.max_retries)?,
        };
        if projector.retry_min_delay > projector.retry_max_delay {
            return Err(AppError::Config(
                "PROJECTOR_RETRY_MIN_DELAY_MS must not exceed PROJECTOR_RETRY_MAX_DELAY_MS".into(),
            ));
        }

        let settings = Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parsed(&get, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parsed(
                &get,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            event_topic: get("EVENT_TOPIC").unwrap_or(defaults.event_topic),
            broker: parsed(&get, "BROKER", defaults.broker)?,
            broker_partitions: parsed(&get, "BROKER_PARTITIONS", defaults.broker_partitions)?,
            kafka_bootstrap_servers: get("KAFKA_BOOTSTRAP_SERVERS"),
            consumer_group_id: get("CONSUMER_GROUP_ID").unwrap_or(defaults.consumer_group_id),
            projector,
            outbox_relay_interval: Duration::from_secs(parsed(
                &get,
                "OUTBOX_RELAY_INTERVAL_SECS",
                defaults.outbox_relay_interval.as_secs(),
            )?),
            outbox_relay_batch_size: defaults.outbox_relay_batch_size,
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        };

        if settings.broker_partitions == 0 {
            return Err(AppError::Config("BROKER_PARTITIONS must be at least 1".into()));
        }
        if settings.outbox_relay_interval.is_zero() {
            return Err(AppError::Config(
                "OUTBOX_RELAY_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        if settings.broker == BrokerKind::Kafka && settings.kafka_bootstrap_servers.is_none() {
            return Err(AppError::Config(
                "KAFKA_BOOTSTRAP_SERVERS must be set when BROKER=kafka".into(),
            ));
        }

        Ok(settings)
    }

    /// The `HOST:PORT` address to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn millis(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parsed(get, key, default).map(Duration::from_millis)
}
