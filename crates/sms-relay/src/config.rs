//! Configuration for the relay.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use sms_store::RedisOptions;
use std::net::IpAddr;
use std::time::Duration;

/// Relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Message store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Message handling configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which backend holds pending messages
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis host
    #[serde(default = "default_store_host")]
    pub host: String,

    /// Redis port
    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Redis ACL username
    #[serde(default)]
    pub username: Option<String>,

    /// Redis password
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Redis database index
    #[serde(default)]
    pub db: i64,

    /// Prefix for stored keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timeout for the initial connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for each Redis reply
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Health probe interval while connected
    #[serde(default = "default_keepalive", with = "humantime_serde")]
    pub keepalive: Duration,

    /// Maximum delay between reconnect attempts
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Expired entry sweep interval (memory backend)
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// How long a message waits for its reader
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_store_host(),
            port: default_store_port(),
            username: None,
            password: None,
            db: 0,
            key_prefix: default_key_prefix(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            keepalive: default_keepalive(),
            max_backoff: default_max_backoff(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_store_host() -> String {
    "127.0.0.1".into()
}

fn default_store_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "sms:".into()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive() -> Duration {
    Duration::from_secs(10)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_ttl() -> Duration {
    crate::relay::DEFAULT_TTL
}

fn default_max_body_bytes() -> usize {
    crate::api::DEFAULT_BODY_LIMIT
}

fn default_log_level() -> String {
    "info".into()
}

impl StoreConfig {
    /// Redis connection settings derived from this configuration.
    pub fn redis_options(&self) -> RedisOptions {
        RedisOptions {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            db: self.db,
            key_prefix: self.key_prefix.clone(),
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            keepalive: self.keepalive,
            max_backoff: self.max_backoff,
        }
    }
}

impl ServerConfig {
    /// Parsed bind address.
    pub fn listen_ip(&self) -> Result<IpAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("SERVER__LISTEN_ADDR is not an IP address: {:?}", self.listen_addr))
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_source(config::Environment::default().separator("__"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.server.listen_ip()?;
        if self.relay.ttl.is_zero() {
            anyhow::bail!("RELAY__TTL must be greater than zero");
        }
        if self.store.key_prefix.contains(char::is_whitespace) {
            anyhow::bail!("STORE__KEY_PREFIX must not contain whitespace");
        }
        if self.store.command_timeout.is_zero() {
            anyhow::bail!("STORE__COMMAND_TIMEOUT must be greater than zero");
        }
        Ok(())
    }
}
