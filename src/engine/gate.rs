//! Engine admission gate
//!
//! Process-wide limit on concurrent engine calls. Waiters are admitted in
//! arrival order (tokio's semaphore is fair), and the blocking call runs on
//! the blocking pool while holding its permit.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::core::error::{Result, TtsError};

#[derive(Debug, Default)]
struct GateCounters {
    waiting: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicU64,
}

/// Decrements `running` when the blocking call ends, however it ends
struct RunningGuard(Arc<GateCounters>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::Relaxed);
        self.0.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Gate statistics
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GateStats {
    pub max_concurrent: usize,
    pub running: usize,
    pub waiting: usize,
    pub completed: u64,
}

/// FIFO gate in front of the engine
#[derive(Debug)]
pub struct EngineGate {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    counters: Arc<GateCounters>,
}

impl EngineGate {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            counters: Arc::new(GateCounters::default()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a permit, then run `job` on the blocking pool
    ///
    /// The permit moves into the blocking task, so it stays held until the
    /// engine call returns even if the caller stops waiting.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.counters.waiting.fetch_add(1, Ordering::Relaxed);
        let acquired = Arc::clone(&self.permits).acquire_owned().await;
        self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
        let permit = acquired.map_err(|_| TtsError::internal("engine gate closed"))?;

        self.counters.running.fetch_add(1, Ordering::Relaxed);
        let guard = RunningGuard(Arc::clone(&self.counters));
        trace!(available = self.permits.available_permits(), "engine permit granted");

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = guard;
            job()
        });

        handle.await.map_err(|e| {
            if e.is_panic() {
                TtsError::engine("engine call panicked", false)
            } else {
                TtsError::internal(format!("engine task failed: {}", e))
            }
        })?
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            max_concurrent: self.max_concurrent,
            running: self.counters.running.load(Ordering::Relaxed),
            waiting: self.counters.waiting.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineGate {
    fn default() -> Self {
        Self::new(1)
    }
}
