use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use flume::TrySendError;
use tracing::{debug, info};

use dynpool_api::{DynamicPoolError, PoolController, PoolError, PoolStats};

use super::worker;
use crate::config::WorkerPoolConfig;
use crate::logging;

/// Unit of work run by a pool worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Live sizing of a pool. Guarded as one unit so core and maximum are always
/// read and written as a consistent pair.
#[derive(Debug, Clone, Copy)]
pub(super) struct Sizing {
    pub(super) core: usize,
    pub(super) max: usize,
    /// Workers alive or reserved for start.
    pub(super) live: usize,
}

/// State shared between the pool handle and its workers.
pub(super) struct PoolInner {
    pub(super) name: String,
    sizing: Mutex<Sizing>,
    terminated: Condvar,
    sender: RwLock<Option<flume::Sender<Job>>>,
    pub(super) receiver: flume::Receiver<Job>,
    queue_capacity: usize,
    pub(super) keep_alive: Duration,
    pub(super) active: AtomicUsize,
    pub(super) completed: AtomicU64,
    next_worker_id: AtomicUsize,
    shutdown: AtomicBool,
    pub(super) dispatch: tracing::Dispatch,
}

/// Bounded pool of worker threads with a runtime-adjustable size
///
/// Job admission follows the classic executor policy:
/// 1. fewer than `core` workers alive: start a worker for the job
/// 2. otherwise queue the job
/// 3. queue full and fewer than `max` workers alive: start a worker for the job
/// 4. otherwise reject it
///
/// Workers above the core size retire after `keep_alive` without work, and
/// workers above the maximum retire as soon as they finish their current job.
/// Shrinking therefore takes effect gradually, never by interrupting a job.
///
/// # Examples
///
/// ```rust
/// use dynpool::config::WorkerPoolConfig;
/// use dynpool::pool::WorkerPool;
/// use dynpool_api::PoolController;
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new("orderPool", 2, 4)).unwrap();
/// pool.execute(|| println!("processing order")).unwrap();
///
/// pool.set_maximum_pool_size(8).unwrap();
/// pool.set_core_pool_size(6).unwrap();
/// assert_eq!(pool.stats().core_pool_size, 6);
///
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool. No worker starts until the first job arrives.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, DynamicPoolError> {
        config.validate()?;
        let (sender, receiver) = flume::bounded(config.queue_capacity);

        let inner = PoolInner {
            name: config.name,
            sizing: Mutex::new(Sizing {
                core: config.core_pool_size,
                max: config.maximum_pool_size,
                live: 0,
            }),
            terminated: Condvar::new(),
            sender: RwLock::new(Some(sender)),
            receiver,
            queue_capacity: config.queue_capacity,
            keep_alive: config.keep_alive,
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            next_worker_id: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            dispatch: logging::current_subscriber(),
        };
        crate::log_pool_event!(
            inner.name,
            "created",
            core = config.core_pool_size,
            max = config.maximum_pool_size,
            queue_capacity = config.queue_capacity
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submit a job
    ///
    /// # Errors
    /// * [`PoolError::Rejected`] - queue full and the pool is at its maximum size
    /// * [`PoolError::ShutDown`] - the pool no longer accepts jobs
    /// * [`PoolError::Spawn`] - the OS refused to start a worker thread
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        if self.is_shutdown() {
            return Err(PoolError::ShutDown);
        }

        if self.inner.reserve_worker(|s| s.live < s.core) {
            return self.inner.start_worker(Some(job));
        }

        let rejected = {
            let sender = self
                .inner
                .sender
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match sender.as_ref() {
                None => return Err(PoolError::ShutDown),
                Some(sender) => match sender.try_send(job) {
                    Ok(()) => None,
                    Err(TrySendError::Full(job)) => Some(job),
                    Err(TrySendError::Disconnected(_)) => return Err(PoolError::ShutDown),
                },
            }
        };

        match rejected {
            None => {
                // A pool with core size zero still needs one worker to drain its queue.
                if self.inner.reserve_worker(|s| s.live == 0 && s.max > 0) {
                    self.inner.start_worker(None)?;
                }
                Ok(())
            }
            Some(job) => {
                if self.inner.reserve_worker(|s| s.live < s.max) {
                    self.inner.start_worker(Some(job))
                } else {
                    debug!(pool = %self.inner.name, "queue full at maximum size, rejecting job");
                    Err(PoolError::Rejected {
                        pool: self.inner.name.clone(),
                    })
                }
            }
        }
    }

    /// Stop accepting jobs. Queued jobs still run; workers exit once the
    /// queue is drained.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        crate::log_pool_event!(self.inner.name, "shutdown", queued = self.inner.receiver.len());
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Block until every worker has exited or `timeout` elapses.
    ///
    /// # Returns
    /// `true` if no worker is alive anymore
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let guard = self.inner.sizing();
        let (_guard, result) = self
            .inner
            .terminated
            .wait_timeout_while(guard, timeout, |s| s.live > 0)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }
}

impl PoolInner {
    pub(super) fn sizing(&self) -> MutexGuard<'_, Sizing> {
        self.sizing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a worker slot if `admit` allows it.
    fn reserve_worker(&self, admit: impl Fn(&Sizing) -> bool) -> bool {
        let mut sizing = self.sizing();
        if admit(&sizing) {
            sizing.live += 1;
            true
        } else {
            false
        }
    }

    /// Start a worker on a slot reserved with `reserve_worker`.
    fn start_worker(self: &Arc<Self>, task: Option<Job>) -> Result<(), PoolError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, id))
            .spawn(move || worker::run(inner, task));

        match spawned {
            Ok(_) => {
                debug!(pool = %self.name, worker = id, "worker started");
                Ok(())
            }
            Err(err) => {
                self.release_worker();
                crate::log_error!(err, pool = %self.name, "failed to start worker");
                Err(PoolError::Spawn(err.to_string()))
            }
        }
    }

    /// Give back a worker slot.
    pub(super) fn release_worker(&self) {
        let mut sizing = self.sizing();
        sizing.live = sizing.live.saturating_sub(1);
        if sizing.live == 0 {
            self.terminated.notify_all();
        }
    }

    /// Retire the calling worker when the pool holds more workers than its
    /// maximum.
    pub(super) fn retire_if_excess(&self) -> bool {
        self.retire_if(|s, _| s.live > s.max)
    }

    /// Retire the calling idle worker when the pool holds more workers than its
    /// core size. The last worker stays while jobs are queued.
    pub(super) fn retire_if_idle(&self) -> bool {
        self.retire_if(|s, queued| s.live > s.core && !(s.live == 1 && queued))
    }

    fn retire_if(&self, should_retire: impl Fn(&Sizing, bool) -> bool) -> bool {
        let mut sizing = self.sizing();
        if !should_retire(&sizing, !self.receiver.is_empty()) {
            return false;
        }
        sizing.live -= 1;
        if sizing.live == 0 {
            self.terminated.notify_all();
        }
        true
    }

    fn snapshot(&self) -> PoolStats {
        let sizing = self.sizing();
        PoolStats {
            core_pool_size: sizing.core,
            maximum_pool_size: sizing.max,
            pool_size: sizing.live,
            active_count: self.active.load(Ordering::SeqCst),
            queue_size: self.receiver.len(),
            completed_task_count: self.completed.load(Ordering::SeqCst),
            queue_capacity: self.queue_capacity,
        }
    }
}

impl PoolController for WorkerPool {
    fn core_pool_size(&self) -> usize {
        self.inner.sizing().core
    }

    fn maximum_pool_size(&self) -> usize {
        self.inner.sizing().max
    }

    fn set_core_pool_size(&self, size: usize) -> Result<(), PoolError> {
        let prestart = {
            let mut sizing = self.inner.sizing();
            if size > sizing.max {
                return Err(PoolError::InvalidSize {
                    core: size,
                    max: sizing.max,
                });
            }
            let previous = sizing.core;
            sizing.core = size;
            info!(pool = %self.inner.name, from = previous, to = size, "core pool size changed");

            // Queued jobs get workers right away instead of waiting for new submissions.
            let prestart = if self.is_shutdown() {
                0
            } else {
                size.saturating_sub(sizing.live)
                    .min(self.inner.receiver.len())
            };
            sizing.live += prestart;
            prestart
        };

        for started in 0..prestart {
            if let Err(err) = self.inner.start_worker(None) {
                for _ in started + 1..prestart {
                    self.inner.release_worker();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn set_maximum_pool_size(&self, size: usize) -> Result<(), PoolError> {
        let mut sizing = self.inner.sizing();
        // A zero maximum would leave queued jobs without any worker.
        if size == 0 || size < sizing.core {
            return Err(PoolError::InvalidSize {
                core: sizing.core,
                max: size,
            });
        }
        let previous = sizing.max;
        sizing.max = size;
        info!(pool = %self.inner.name, from = previous, to = size, "maximum pool size changed");
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        self.inner.snapshot()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("stats", &self.inner.snapshot())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
