//! Worker thread loop.
//!
//! ## Core Algorithm
//! 1. Run the job the worker was started with, if any
//! 2. Retire if the pool now holds more workers than its maximum
//! 3. Wait up to `keep_alive` for the next queued job
//! 4. On timeout retire if the pool holds more workers than its core size
//! 5. On disconnect (pool shut down and queue drained) retire

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use flume::RecvTimeoutError;
use tracing::{trace, warn};

use super::worker_pool::{Job, PoolInner};

pub(super) fn run(inner: Arc<PoolInner>, mut task: Option<Job>) {
    let _dispatch = tracing::dispatcher::set_default(&inner.dispatch);
    let span = crate::pool_span!(inner.name);
    let _entered = span.enter();
    trace!("worker running");

    loop {
        if let Some(job) = task.take() {
            run_job(&inner, job);
        }

        if inner.retire_if_excess() {
            trace!("worker retired, pool above maximum size");
            return;
        }

        match inner.receiver.recv_timeout(inner.keep_alive) {
            Ok(job) => task = Some(job),
            Err(RecvTimeoutError::Timeout) => {
                if inner.retire_if_idle() {
                    trace!("worker retired after keep-alive");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                inner.release_worker();
                trace!("worker exited, pool shut down");
                return;
            }
        }
    }
}

/// Run one job, isolating panics so the worker survives them.
fn run_job(inner: &PoolInner, job: Job) {
    inner.active.fetch_add(1, Ordering::SeqCst);
    let outcome = panic::catch_unwind(AssertUnwindSafe(job));
    inner.active.fetch_sub(1, Ordering::SeqCst);
    inner.completed.fetch_add(1, Ordering::SeqCst);

    if let Err(payload) = outcome {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(panic = %message, "job panicked");
    }
}
