//! # Registry Contract
//!
//! The registry is the only capability the control plane needs from its
//! backing store: a durable key-value store for pool configuration plus a
//! publish/subscribe channel for change events.
//!
//! ## Delivery Semantics
//!
//! - `publish` is best-effort and at-most-once to the subscribers present at
//!   publish time; nothing is replayed or acknowledged
//! - successive publishes from one publisher arrive in order; publishes from
//!   different publishers are not ordered relative to each other
//! - every subscription owns a dedicated delivery task that invokes its
//!   handler once per message, sequentially, concurrently with any other
//!   registry activity
//! - a payload that cannot be decoded is dropped and logged; the subscription
//!   stays alive
//!
//! ## Failure
//!
//! Implementations retry transient failures themselves and return
//! [`RegistryError::Unavailable`] only once their retry budget is spent.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entity::ThreadPoolConfigEntity;
use crate::errors::RegistryError;

/// Callback invoked on the delivery task for each change event.
pub type ChangeHandler =
    Arc<dyn Fn(ThreadPoolConfigEntity) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`ChangeHandler`].
///
/// # Examples
///
/// ```rust
/// use dynpool_api::handler_fn;
///
/// let handler = handler_fn(|entity| async move {
///     println!("resize {} to {}", entity.thread_pool_name, entity.core_pool_size);
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> ChangeHandler
where
    F: Fn(ThreadPoolConfigEntity) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |entity| f(entity).boxed())
}

/// Decode one change-channel payload.
pub fn decode_change(payload: &str) -> Result<ThreadPoolConfigEntity, RegistryError> {
    Ok(ThreadPoolConfigEntity::from_json(payload)?)
}

/// Durable key-value store plus publish/subscribe channel.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Append a pool list report for `app_name`.
    ///
    /// The store enforces no ordering or uniqueness; callers pass a complete,
    /// de-duplicated snapshot.
    async fn put_list(
        &self,
        app_name: &str,
        entities: &[ThreadPoolConfigEntity],
    ) -> Result<(), RegistryError>;

    /// Last stored config of one pool, if any.
    async fn get_config(
        &self,
        app_name: &str,
        pool_name: &str,
    ) -> Result<Option<ThreadPoolConfigEntity>, RegistryError>;

    /// Upsert the config of `entity`'s pool, expiring after `ttl`.
    async fn put_config(
        &self,
        entity: &ThreadPoolConfigEntity,
        ttl: Duration,
    ) -> Result<(), RegistryError>;

    /// Publish a change event on the change channel of `app_name`.
    async fn publish(
        &self,
        app_name: &str,
        entity: &ThreadPoolConfigEntity,
    ) -> Result<(), RegistryError>;

    /// Register `handler` on the change channel of `app_name`.
    async fn subscribe(
        &self,
        app_name: &str,
        handler: ChangeHandler,
    ) -> Result<Subscription, RegistryError>;
}

/// Handle of a live subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`unsubscribe`](Subscription::unsubscribe) to stop delivery.
pub struct Subscription {
    id: Uuid,
    channel: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap the delivery task of a subscription to `channel`.
    pub fn new(channel: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the delivery task is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop delivery. A handler invocation in progress is cancelled at its
    /// next await point.
    pub fn unsubscribe(self) {
        tracing::debug!(subscription = %self.id, channel = %self.channel, "unsubscribing");
        self.task.abort();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}
