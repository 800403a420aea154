//! Redis-backed message store.
//!
//! Expiry is delegated to Redis (`SET ... PX`), which never returns a key
//! past its deadline. Read-once is a `MULTI`/`GET`/`DEL`/`EXEC` transaction.
//!
//! A supervisor task owns the connection lifecycle: it pings while `Ready`,
//! and reconnects with exponential backoff while `Degraded`. Operations never
//! retry; while the connection is not `Ready` they fail with `Unavailable`.
//!
//! Only transport failures (I/O, dropped connection, no reply in time)
//! degrade the connection. A server error reply to one command is handed
//! back as `Rejected` and leaves every other key usable.

use crate::error::StoreError;
use crate::state::{ConnectionMonitor, ConnectionState};
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Backoff before the first reconnect attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub db: i64,
    /// Prepended to every canonical key.
    pub key_prefix: String,
    pub connect_timeout: Duration,
    /// Deadline for a reply to any single command, keepalive pings included.
    pub command_timeout: Duration,
    /// Ping interval while the connection is healthy.
    pub keepalive: Duration,
    /// Upper bound for reconnect backoff.
    pub max_backoff: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
            key_prefix: "sms:".into(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            keepalive: Duration::from_secs(10),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RedisOptions {
    /// Full Redis key for a canonical phone number.
    pub fn key_for(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn connection_info(&self) -> Result<ConnectionInfo, StoreError> {
        let mut info = (self.host.as_str(), self.port)
            .into_connection_info()
            .map_err(|e| StoreError::Fatal(format!("invalid redis address: {}", e)))?;
        info.redis.db = self.db;
        info.redis.username = self.username.clone();
        info.redis.password = self.password.as_ref().map(|p| p.expose_secret().clone());
        Ok(info)
    }
}

/// Expiry argument for `SET ... PX`. Redis rejects a zero expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

struct Shared {
    client: Client,
    options: RedisOptions,
    connection: RwLock<Option<MultiplexedConnection>>,
    monitor: ConnectionMonitor,
}

impl Shared {
    async fn current_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.monitor.ensure_ready()?;
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("no connection".into()))
    }

    /// Await a command reply within `command_timeout`, recording any
    /// failure in the connection state.
    async fn run<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.options.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.fail(StoreError::from(e)).await),
            Err(_) => {
                let err = StoreError::Unavailable(format!(
                    "no reply within {:?}",
                    self.options.command_timeout
                ));
                Err(self.fail(err).await)
            }
        }
    }

    /// Record a failed operation and hand back the error.
    async fn fail(&self, err: StoreError) -> StoreError {
        match &err {
            StoreError::Fatal(_) => {
                self.monitor.transition(ConnectionState::Fatal);
            }
            StoreError::Unavailable(_) => {
                if self.monitor.transition(ConnectionState::Degraded) {
                    self.connection.write().await.take();
                }
            }
            StoreError::Rejected(_) | StoreError::Closed => {}
        }
        err
    }
}

async fn open(client: &Client) -> Result<MultiplexedConnection, redis::RedisError> {
    let mut conn = client.get_multiplexed_tokio_connection().await?;
    redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
    Ok(conn)
}

/// Message store backed by a Redis server.
pub struct RedisStore {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStore {
    /// Connect and start the supervisor.
    ///
    /// Any failure here is fatal: bad credentials and an unreachable server
    /// at startup are configuration errors, not conditions to wait out.
    pub async fn connect(options: RedisOptions) -> Result<Self, StoreError> {
        let client = Client::open(options.connection_info()?)
            .map_err(|e| StoreError::from(e).into_fatal())?;
        let monitor = ConnectionMonitor::new(ConnectionState::Connecting);

        info!(host = %options.host, port = options.port, db = options.db, "Connecting to Redis");

        let conn = match tokio::time::timeout(options.connect_timeout, open(&client)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                monitor.transition(ConnectionState::Fatal);
                return Err(StoreError::from(e).into_fatal());
            }
            Err(_) => {
                monitor.transition(ConnectionState::Fatal);
                return Err(StoreError::Fatal(format!(
                    "timed out after {:?} connecting to {}:{}",
                    options.connect_timeout, options.host, options.port
                )));
            }
        };

        monitor.transition(ConnectionState::Ready);

        let shared = Arc::new(Shared {
            client,
            options,
            connection: RwLock::new(Some(conn)),
            monitor,
        });

        let supervisor = tokio::spawn(supervise(Arc::downgrade(&shared)));

        Ok(Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    #[instrument(skip(self, body), fields(len = body.len()))]
    pub async fn put(&self, key: &str, body: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.shared.current_connection().await?;
        let key = self.shared.options.key_for(key);

        let mut set = redis::cmd("SET");
        set.arg(&key).arg(body).arg("PX").arg(ttl_millis(ttl));

        self.shared
            .run(set.query_async::<_, ()>(&mut conn))
            .await?;

        debug!("Stored message");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn take_if_present(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.shared.current_connection().await?;
        let key = self.shared.options.key_for(key);

        let mut take = redis::pipe();
        take.atomic().get(&key).del(&key);

        let (body, _deleted) = self
            .shared
            .run(take.query_async::<_, (Option<String>, i64)>(&mut conn))
            .await?;

        if body.is_some() {
            debug!("Took message");
        }
        Ok(body)
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.shared.monitor
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.monitor.state()
    }

    pub fn options(&self) -> &RedisOptions {
        &self.shared.options
    }

    /// Stop the supervisor and drop the connection.
    pub async fn disconnect(&self) {
        self.shared.monitor.transition(ConnectionState::Closed);
        if let Some(handle) = self.supervisor.lock().ok().and_then(|mut s| s.take()) {
            handle.abort();
        }
        self.shared.connection.write().await.take();
        info!("Disconnected from Redis");
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}

/// Keepalive and reconnect loop.
async fn supervise(shared: Weak<Shared>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let Some(current) = shared.upgrade() else {
            break;
        };
        let state = current.monitor.state();
        let keepalive = current.options.keepalive;
        let max_backoff = current.options.max_backoff;
        drop(current);

        match state {
            ConnectionState::Fatal | ConnectionState::Closed => break,
            ConnectionState::Ready => {
                tokio::time::sleep(keepalive).await;
                let Some(current) = shared.upgrade() else {
                    break;
                };
                if let Ok(mut conn) = current.current_connection().await {
                    let ping = redis::cmd("PING");
                    if let Err(e) = current.run(ping.query_async::<_, String>(&mut conn)).await {
                        warn!("Redis keepalive failed: {}", e);
                    }
                }
                backoff = INITIAL_BACKOFF;
            }
            ConnectionState::Connecting | ConnectionState::Degraded => {
                tokio::time::sleep(backoff).await;
                let Some(current) = shared.upgrade() else {
                    break;
                };
                let attempt =
                    tokio::time::timeout(current.options.connect_timeout, open(&current.client))
                        .await
                        .unwrap_or_else(|_| {
                            Err(redis::RedisError::from(std::io::Error::from(
                                std::io::ErrorKind::TimedOut,
                            )))
                        });

                match attempt {
                    Ok(conn) => {
                        *current.connection.write().await = Some(conn);
                        current.monitor.transition(ConnectionState::Ready);
                        backoff = INITIAL_BACKOFF;
                    }
                    Err(e) => match StoreError::from(e) {
                        StoreError::Fatal(reason) => {
                            warn!("Redis rejected reconnect: {}", reason);
                            current.monitor.transition(ConnectionState::Fatal);
                        }
                        other => {
                            debug!(?backoff, "Redis reconnect failed: {}", other);
                            backoff = (backoff * 2).min(max_backoff);
                        }
                    },
                }
            }
        }
    }

    debug!("Redis supervisor stopped");
}
