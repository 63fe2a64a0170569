use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dynpool_api::keys;
use dynpool_api::registry::decode_change;
use dynpool_api::{ChangeHandler, Registry, RegistryError, Subscription, ThreadPoolConfigEntity};

use crate::config::DEFAULT_MAX_LIST_LEN;

/// Process-local [`Registry`].
///
/// Stores the same JSON payloads under the same keys as the Redis registry,
/// so code exercised against it takes the same encode/decode paths. Intended
/// for single-process deployments, tests and local development.
///
/// Outages can be simulated with [`set_available`](MemoryRegistry::set_available):
/// while unavailable every operation fails with [`RegistryError::Unavailable`].
///
/// The pool list keeps the newest `max_list_len` entries, like the Redis
/// registry's trimmed list.
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    max_list_len: usize,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            unavailable: AtomicBool::new(false),
            max_list_len: DEFAULT_MAX_LIST_LEN,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<String, Vec<String>>,
    values: HashMap<String, StoredValue>,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

struct StoredValue {
    payload: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_list_len` entries on the pool list (at least one).
    pub fn with_max_list_len(mut self, max_list_len: usize) -> Self {
        self.max_list_len = max_list_len.max(1);
        self
    }

    /// Toggle simulated availability.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Every entity reported for `app_name`, oldest first.
    pub fn list(&self, app_name: &str) -> Vec<ThreadPoolConfigEntity> {
        let state = self.state();
        state
            .lists
            .get(keys::pool_list_key())
            .into_iter()
            .flatten()
            .filter_map(|payload| ThreadPoolConfigEntity::from_json(payload).ok())
            .filter(|entity| entity.app_name == app_name)
            .collect()
    }

    /// The unexpired parameter entry of one pool, bypassing availability.
    pub fn stored_config(&self, app_name: &str, pool_name: &str) -> Option<ThreadPoolConfigEntity> {
        let key = keys::config_parameter_key(app_name, pool_name);
        let state = self.state();
        state
            .values
            .get(&key)
            .filter(|value| value.is_live(Instant::now()))
            .and_then(|value| ThreadPoolConfigEntity::from_json(&value.payload).ok())
    }

    /// Number of live subscribers on the change channel of `app_name`.
    pub fn subscriber_count(&self, app_name: &str) -> usize {
        let state = self.state();
        state
            .channels
            .get(&keys::change_channel(app_name))
            .map_or(0, |subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Publish an arbitrary payload on the change channel of `app_name`.
    ///
    /// Used to feed subscribers payloads other tooling might produce,
    /// including malformed ones.
    pub fn publish_raw(&self, app_name: &str, payload: impl Into<String>) -> Result<usize, RegistryError> {
        self.ensure_available()?;
        let channel = keys::change_channel(app_name);
        let payload = payload.into();

        let mut state = self.state();
        let Some(subscribers) = state.channels.get_mut(&channel) else {
            return Ok(0);
        };
        // At-most-once: closed receivers are dropped, nothing is buffered for them.
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        debug!(channel = %channel, receivers = subscribers.len(), "published change");
        Ok(subscribers.len())
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RegistryError::Unavailable("memory registry marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put_list(
        &self,
        _app_name: &str,
        entities: &[ThreadPoolConfigEntity],
    ) -> Result<(), RegistryError> {
        self.ensure_available()?;
        let payloads = entities
            .iter()
            .map(ThreadPoolConfigEntity::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state();
        let list = state
            .lists
            .entry(keys::pool_list_key().to_string())
            .or_default();
        list.extend(payloads);
        let excess = list.len().saturating_sub(self.max_list_len);
        list.drain(..excess);
        Ok(())
    }

    async fn get_config(
        &self,
        app_name: &str,
        pool_name: &str,
    ) -> Result<Option<ThreadPoolConfigEntity>, RegistryError> {
        self.ensure_available()?;
        let key = keys::config_parameter_key(app_name, pool_name);
        let now = Instant::now();

        let mut state = self.state();
        let stored = state
            .values
            .get(&key)
            .map(|value| (value.is_live(now), value.payload.clone()));

        match stored {
            Some((true, payload)) => {
                drop(state);
                Ok(Some(ThreadPoolConfigEntity::from_json(&payload)?))
            }
            Some((false, _)) => {
                state.values.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_config(
        &self,
        entity: &ThreadPoolConfigEntity,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        self.ensure_available()?;
        let key = keys::config_parameter_key(&entity.app_name, &entity.thread_pool_name);
        let value = StoredValue {
            payload: entity.to_json()?,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.state().values.insert(key, value);
        Ok(())
    }

    async fn publish(
        &self,
        app_name: &str,
        entity: &ThreadPoolConfigEntity,
    ) -> Result<(), RegistryError> {
        let payload = entity.to_json()?;
        self.publish_raw(app_name, payload).map(|_| ())
    }

    async fn subscribe(
        &self,
        app_name: &str,
        handler: ChangeHandler,
    ) -> Result<Subscription, RegistryError> {
        self.ensure_available()?;
        let channel = keys::change_channel(app_name);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.state()
            .channels
            .entry(channel.clone())
            .or_default()
            .push(tx);

        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match decode_change(&payload) {
                    Ok(entity) => handler(entity).await,
                    Err(err) => {
                        warn!(channel = %task_channel, error = %err, "dropping malformed change message");
                    }
                }
            }
        });

        Ok(Subscription::new(channel, task))
    }
}

impl fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryRegistry")
            .field("lists", &state.lists.len())
            .field("values", &state.values.len())
            .field("channels", &state.channels.len())
            .field("max_list_len", &self.max_list_len)
            .field("available", &!self.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}
