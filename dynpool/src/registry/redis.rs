use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dynpool_api::keys;
use dynpool_api::registry::decode_change;
use dynpool_api::{
    ChangeHandler, DynamicPoolError, Registry, RegistryError, Subscription, ThreadPoolConfigEntity,
};

use super::retry::RetryPolicy;
use crate::config::RedisRegistryConfig;

/// Lower bound on the pause before re-opening a lost subscription.
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

fn unavailable(err: redis::RedisError) -> RegistryError {
    RegistryError::Unavailable(err.to_string())
}

/// Errors after which the multiplexed connection cannot be used again.
fn is_connection_lost(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_unrecoverable_error() || err.is_timeout()
}

/// The shared command connection, re-established after it is lost.
struct ConnectionSlot {
    client: redis::Client,
    response_timeout: Duration,
    connect_timeout: Duration,
    current: Mutex<Option<MultiplexedConnection>>,
}

impl ConnectionSlot {
    /// The live connection, opening a new one if the last was dropped.
    async fn get(&self) -> Result<MultiplexedConnection, RegistryError> {
        let mut current = self.current.lock().await;
        if let Some(connection) = current.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                self.response_timeout,
                self.connect_timeout,
            )
            .await
            .map_err(unavailable)?;
        debug!("redis connection established");
        *current = Some(connection.clone());
        Ok(connection)
    }

    /// Drop the current connection; the next command reconnects.
    async fn reset(&self) {
        if self.current.lock().await.take().is_some() {
            warn!("redis connection lost, reconnecting on next command");
        }
    }

    /// Run `command` on the live connection, dropping it on connection loss.
    async fn run<T, F, Fut>(&self, command: F) -> Result<T, RegistryError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let connection = self.get().await?;
        match command(connection).await {
            Ok(value) => Ok(value),
            Err(err) => {
                if is_connection_lost(&err) {
                    self.reset().await;
                }
                Err(unavailable(err))
            }
        }
    }
}

/// [`Registry`] backed by Redis.
///
/// - values are the JSON encoding of [`ThreadPoolConfigEntity`]
/// - the pool list is a Redis list appended with `RPUSH` and trimmed to the
///   newest `max_list_len` entries in the same transaction
/// - parameter entries are strings written with `SET .. EX`
/// - change events use Redis pub/sub; every subscription holds its own
///   connection and delivery task
///
/// Commands share one multiplexed connection. At most `pool_size` of them are
/// in flight at once, and each is retried according to the configured
/// attempts and interval before [`RegistryError::Unavailable`] is returned.
/// A connection that fails at the transport level is dropped and the next
/// attempt opens a fresh one, so a server restart costs a few failed
/// attempts rather than the registry.
pub struct RedisRegistry {
    client: redis::Client,
    connection: Arc<ConnectionSlot>,
    permits: Semaphore,
    retry: RetryPolicy,
    config: RedisRegistryConfig,
    keep_alive_task: Option<JoinHandle<()>>,
}

impl RedisRegistry {
    /// Connect to the server described by `config`.
    ///
    /// # Errors
    /// * [`DynamicPoolError::Config`] - invalid settings or connection URL
    /// * [`DynamicPoolError::Registry`] - server unreachable after retries
    pub async fn connect(config: RedisRegistryConfig) -> Result<Self, DynamicPoolError> {
        config.validate()?;
        let client = redis::Client::open(config.url())
            .map_err(|err| DynamicPoolError::Config(format!("invalid redis url: {err}")))?;
        let retry = RetryPolicy::from(&config);

        let connection = Arc::new(ConnectionSlot {
            client: client.clone(),
            response_timeout: config.idle_timeout,
            connect_timeout: config.connect_timeout,
            current: Mutex::new(None),
        });
        retry.run("connect", || connection.get()).await?;

        let keep_alive_task = (config.keep_alive && !config.ping_interval.is_zero())
            .then(|| spawn_keep_alive(Arc::clone(&connection), config.ping_interval));

        info!(
            host = %config.host,
            port = config.port,
            database = config.database,
            pool_size = config.pool_size,
            "redis registry connected"
        );

        Ok(Self {
            client,
            connection,
            permits: Semaphore::new(config.pool_size),
            retry,
            config,
            keep_alive_task,
        })
    }

    pub fn config(&self) -> &RedisRegistryConfig {
        &self.config
    }

    /// Run one request with the concurrency bound and the retry policy.
    async fn execute<T, F, Fut>(&self, operation: &str, request: F) -> Result<T, RegistryError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RegistryError::Unavailable("redis registry closed".into()))?;

        let connection = &*self.connection;
        let request = &request;
        let result = self
            .retry
            .run(operation, move || connection.run(move |conn| request(conn)))
            .await;

        match &result {
            Ok(_) => crate::log_registry!(operation, "ok"),
            Err(err) => crate::log_registry!(operation, "failed", error = %err),
        }
        result
    }

    async fn query<T>(&self, operation: &str, cmd: redis::Cmd) -> Result<T, RegistryError>
    where
        T: redis::FromRedisValue + Send,
    {
        self.execute(operation, |mut connection| {
            let cmd = cmd.clone();
            async move { cmd.query_async(&mut connection).await }
        })
        .await
    }
}

async fn open_pubsub(
    client: &redis::Client,
    channel: &str,
    retry: &RetryPolicy,
) -> Result<PubSub, RegistryError> {
    retry
        .run("subscribe", || async {
            let mut pubsub = client.get_async_pubsub().await.map_err(unavailable)?;
            pubsub.subscribe(channel).await.map_err(unavailable)?;
            Ok(pubsub)
        })
        .await
}

fn spawn_keep_alive(connection: Arc<ConnectionSlot>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let pong = connection
                .run(|mut conn| async move {
                    let pong: redis::RedisResult<String> =
                        redis::cmd("PING").query_async(&mut conn).await;
                    pong
                })
                .await;
            match pong {
                Ok(_) => debug!("redis keep-alive ping ok"),
                Err(err) => warn!(error = %err, "redis keep-alive ping failed"),
            }
        }
    })
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn put_list(
        &self,
        _app_name: &str,
        entities: &[ThreadPoolConfigEntity],
    ) -> Result<(), RegistryError> {
        if entities.is_empty() {
            return Ok(());
        }
        let payloads = entities
            .iter()
            .map(ThreadPoolConfigEntity::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        let key = keys::pool_list_key();
        let keep = isize::try_from(self.config.max_list_len).unwrap_or(isize::MAX);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(key, payloads)
            .ignore()
            .ltrim(key, -keep, -1)
            .ignore();

        self.execute("put_list", |mut connection| {
            let pipe = pipe.clone();
            async move {
                let trimmed: redis::RedisResult<()> = pipe.query_async(&mut connection).await;
                trimmed
            }
        })
        .await
    }

    async fn get_config(
        &self,
        app_name: &str,
        pool_name: &str,
    ) -> Result<Option<ThreadPoolConfigEntity>, RegistryError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(keys::config_parameter_key(app_name, pool_name));
        let payload: Option<String> = self.query("get_config", cmd).await?;

        payload
            .map(|payload| ThreadPoolConfigEntity::from_json(&payload).map_err(RegistryError::from))
            .transpose()
    }

    async fn put_config(
        &self,
        entity: &ThreadPoolConfigEntity,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(keys::config_parameter_key(&entity.app_name, &entity.thread_pool_name))
            .arg(entity.to_json()?)
            .arg("EX")
            .arg(ttl.as_secs().max(1));
        self.query("put_config", cmd).await
    }

    async fn publish(
        &self,
        app_name: &str,
        entity: &ThreadPoolConfigEntity,
    ) -> Result<(), RegistryError> {
        let channel = keys::change_channel(app_name);
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(&channel).arg(entity.to_json()?);
        let receivers: i64 = self.query("publish", cmd).await?;
        debug!(channel = %channel, receivers, "published change");
        Ok(())
    }

    async fn subscribe(
        &self,
        app_name: &str,
        handler: ChangeHandler,
    ) -> Result<Subscription, RegistryError> {
        let channel = keys::change_channel(app_name);
        let initial = open_pubsub(&self.client, &channel, &self.retry).await?;

        let client = self.client.clone();
        let retry = self.retry;
        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            let mut pubsub = Some(initial);
            loop {
                let current = match pubsub.take() {
                    Some(current) => current,
                    None => match open_pubsub(&client, &task_channel, &retry).await {
                        Ok(current) => {
                            info!(channel = %task_channel, "change subscription restored");
                            current
                        }
                        Err(err) => {
                            warn!(channel = %task_channel, error = %err, "resubscribe failed");
                            tokio::time::sleep(retry.interval.max(RESUBSCRIBE_BACKOFF)).await;
                            continue;
                        }
                    },
                };

                let mut messages = current.into_on_message();
                while let Some(message) = messages.next().await {
                    let payload: String = match message.get_payload() {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(channel = %task_channel, error = %err, "dropping unreadable change message");
                            continue;
                        }
                    };
                    match decode_change(&payload) {
                        Ok(entity) => handler(entity).await,
                        Err(err) => {
                            warn!(channel = %task_channel, error = %err, "dropping malformed change message");
                        }
                    }
                }
                warn!(channel = %task_channel, "change subscription lost, resubscribing");
            }
        });

        info!(channel = %channel, "subscribed to change channel");
        Ok(Subscription::new(channel, task))
    }
}

impl Drop for RedisRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.keep_alive_task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for RedisRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRegistry")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("retry", &self.retry)
            .finish()
    }
}
