//! Service configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::OrchestratorSettings;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Log output format, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    pub bootstrap_servers: Option<String>,
    pub group_id: String,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
}

/// Service configuration with defaults for everything but the broker address.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `BOOTSTRAP_SERVERS`, `CONSUMER_GROUP_ID` and the `KAFKA_*` security settings
/// - `DATABASE_URL`: PostgreSQL store; the in-memory store is used when unset
/// - `SAGA_DEFAULT_TIMEOUT_SECS`, `SAGA_RESEND_AFTER_SECS`,
///   `SAGA_RETENTION_MINUTES`, `SAGA_SWEEP_INTERVAL_SECS`
///
/// Topic names are resolved separately, see [`messaging::TopicRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub kafka: KafkaSettings,
    pub database_url: Option<String>,
    pub default_timeout_secs: u64,
    pub resend_after_secs: u64,
    pub retention_minutes: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "PORT", 3000)?,
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
            kafka: KafkaSettings {
                bootstrap_servers: get("BOOTSTRAP_SERVERS"),
                group_id: get("CONSUMER_GROUP_ID")
                    .unwrap_or_else(|| "saga-orchestrator".to_string()),
                security_protocol: get("KAFKA_SECURITY_PROTOCOL"),
                sasl_mechanism: get("KAFKA_SASL_MECHANISM"),
                sasl_username: get("KAFKA_SASL_USERNAME"),
                sasl_password: get("KAFKA_SASL_PASSWORD"),
            },
            database_url: get("DATABASE_URL"),
            default_timeout_secs: parse(&get, "SAGA_DEFAULT_TIMEOUT_SECS", 300)?,
            resend_after_secs: parse(&get, "SAGA_RESEND_AFTER_SECS", 30)?,
            retention_minutes: parse(&get, "SAGA_RETENTION_MINUTES", 60)?,
            sweep_interval_secs: parse(&get, "SAGA_SWEEP_INTERVAL_SECS", 5)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_timeout_secs: self.default_timeout_secs,
            resend_after: chrono::Duration::seconds(saturating_i64(self.resend_after_secs)),
            retention: chrono::Duration::minutes(saturating_i64(self.retention_minutes)),
        }
    }

    /// Sweep period; never zero.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Broker client settings; fails without `BOOTSTRAP_SERVERS`.
    #[cfg(feature = "kafka")]
    pub fn kafka_config(&self) -> Result<messaging::broker::KafkaConfig, ConfigError> {
        let servers = self
            .kafka
            .bootstrap_servers
            .as_deref()
            .ok_or(ConfigError::Missing("BOOTSTRAP_SERVERS"))?;

        let mut config = messaging::broker::KafkaConfig::new(servers, &self.kafka.group_id);
        if let Some(protocol) = &self.kafka.security_protocol {
            config = config.with_security_protocol(protocol);
        }
        if let (Some(username), Some(password)) =
            (&self.kafka.sasl_username, &self.kafka.sasl_password)
        {
            let mechanism = self.kafka.sasl_mechanism.as_deref().unwrap_or("PLAIN");
            config = config.with_sasl(username, password, mechanism);
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            kafka: KafkaSettings {
                bootstrap_servers: None,
                group_id: "saga-orchestrator".to_string(),
                security_protocol: None,
                sasl_mechanism: None,
                sasl_username: None,
                sasl_password: None,
            },
            database_url: None,
            default_timeout_secs: 300,
            resend_after_secs: 30,
            retention_minutes: 60,
            sweep_interval_secs: 5,
        }
    }
}

fn parse<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
