//! FILENAME: core/template-engine/src/pool.rs
//! PURPOSE: A bounded pool of reusable formula evaluators.
//! CONTEXT: Building an evaluator allocates a scratch workbook, so renders
//! borrow warm ones from this pool. A background thread evicts evaluators
//! that sat idle too long, never going below the configured minimum.

use crate::error::TemplateResult;
use crate::evaluator::{Evaluation, FormulaEvaluator, GridFormulaEvaluator};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Evaluators created up front and kept through sweeps.
    pub min_size: usize,
    /// Idle evaluators kept; returns beyond this are dropped.
    pub max_size: usize,
    /// Seconds between eviction sweeps. 0 disables the sweeper thread.
    pub sweep_interval_secs: u64,
    /// Seconds an evaluator may sit idle before a sweep may evict it.
    pub idle_timeout_secs: u64,
}

impl PoolConfig {
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_size: 2,
            max_size: 10,
            sweep_interval_secs: 5 * 60,
            idle_timeout_secs: 10 * 60,
        }
    }
}

// ============================================================================
// POOL
// ============================================================================

pub type EvaluatorFactory = Arc<dyn Fn() -> Box<dyn FormulaEvaluator> + Send + Sync>;

struct IdleEvaluator {
    evaluator: Box<dyn FormulaEvaluator>,
    returned_at: Instant,
}

struct PoolShared {
    config: PoolConfig,
    factory: EvaluatorFactory,
    idle: Mutex<Vec<IdleEvaluator>>,
}

impl PoolShared {
    fn idle(&self) -> MutexGuard<'_, Vec<IdleEvaluator>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Box<dyn FormulaEvaluator> {
        let pooled = self.idle().pop();
        match pooled {
            Some(item) => {
                log::trace!("evaluator pool: reusing idle evaluator");
                item.evaluator
            }
            None => {
                log::trace!("evaluator pool: empty, creating evaluator");
                (self.factory)()
            }
        }
    }

    fn give_back(&self, evaluator: Box<dyn FormulaEvaluator>) {
        let mut idle = self.idle();
        if idle.len() < self.config.max_size {
            idle.push(IdleEvaluator {
                evaluator,
                returned_at: Instant::now(),
            });
        } else {
            log::trace!("evaluator pool: full, dropping returned evaluator");
        }
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let timeout = self.config.idle_timeout();
        let mut idle = self.idle();
        let before = idle.len();
        let mut kept = 0;
        idle.retain(|item| {
            let keep = kept < self.config.min_size
                || now.saturating_duration_since(item.returned_at) < timeout;
            if keep {
                kept += 1;
            }
            keep
        });
        let evicted = before - idle.len();
        log::trace!("evaluator pool: sweep evicted {}, {} idle", evicted, idle.len());
        evicted
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Lends evaluators last-in first-out and takes them back on guard drop.
pub struct EvaluatorPool {
    shared: Arc<PoolShared>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl EvaluatorPool {
    /// Builds a pool pre-warmed to `config.min_size` and starts its sweeper.
    pub fn new<F>(config: PoolConfig, factory: F) -> Self
    where
        F: Fn() -> Box<dyn FormulaEvaluator> + Send + Sync + 'static,
    {
        let factory: EvaluatorFactory = Arc::new(factory);
        let now = Instant::now();
        let idle = (0..config.min_size)
            .map(|_| IdleEvaluator {
                evaluator: factory(),
                returned_at: now,
            })
            .collect();

        let shared = Arc::new(PoolShared {
            config,
            factory,
            idle: Mutex::new(idle),
        });
        let sweeper = spawn_sweeper(&shared);
        EvaluatorPool {
            shared,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// A pool of [`GridFormulaEvaluator`]s.
    pub fn with_grid_evaluators(config: PoolConfig) -> Self {
        EvaluatorPool::new(config, || Box::new(GridFormulaEvaluator::new()))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Takes an idle evaluator, or builds one when none is idle. Never waits.
    pub fn borrow(&self) -> PooledEvaluator<'_> {
        PooledEvaluator {
            evaluator: Some(self.shared.take()),
            pool: &self.shared,
        }
    }

    /// Hands an evaluator to the pool; dropped when the pool is full.
    pub fn give_back(&self, evaluator: Box<dyn FormulaEvaluator>) {
        self.shared.give_back(evaluator);
    }

    /// Borrows an evaluator for a single evaluation.
    pub fn evaluate(&self, expression: &str, variables: &Record) -> TemplateResult<Evaluation> {
        self.borrow().evaluate(expression, variables)
    }

    pub fn idle_count(&self) -> usize {
        self.shared.idle().len()
    }

    /// Evicts evaluators idle longer than the timeout as of `now`, keeping at
    /// least `min_size`. Returns how many were evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        self.shared.sweep_at(now)
    }

    /// Stops the sweeper thread. Idempotent; the pool stays usable.
    pub fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop.send(());
            if sweeper.handle.join().is_err() {
                log::warn!("evaluator pool sweeper panicked");
            }
        }
    }
}

impl Drop for EvaluatorPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_sweeper(shared: &Arc<PoolShared>) -> Option<Sweeper> {
    let interval = shared.config.sweep_interval();
    if interval.is_zero() {
        return None;
    }
    let (stop, stopped) = mpsc::channel::<()>();
    let shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("evaluator-pool-sweeper".to_string())
        .spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    shared.sweep_at(Instant::now());
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
    match spawned {
        Ok(handle) => Some(Sweeper { stop, handle }),
        Err(e) => {
            log::warn!("evaluator pool: could not start sweeper thread: {}", e);
            None
        }
    }
}

/// A borrowed evaluator; returns to its pool when dropped.
pub struct PooledEvaluator<'a> {
    evaluator: Option<Box<dyn FormulaEvaluator>>,
    pool: &'a PoolShared,
}

impl Deref for PooledEvaluator<'_> {
    type Target = dyn FormulaEvaluator;

    fn deref(&self) -> &Self::Target {
        match &self.evaluator {
            Some(evaluator) => evaluator.as_ref(),
            None => unreachable!("evaluator is present until drop"),
        }
    }
}

impl DerefMut for PooledEvaluator<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.evaluator {
            Some(evaluator) => evaluator.as_mut(),
            None => unreachable!("evaluator is present until drop"),
        }
    }
}

impl Drop for PooledEvaluator<'_> {
    fn drop(&mut self) {
        if let Some(evaluator) = self.evaluator.take() {
            self.pool.give_back(evaluator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pool(config: PoolConfig) -> (EvaluatorPool, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = EvaluatorPool::new(config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(GridFormulaEvaluator::new())
        });
        (pool, created)
    }

    fn small_config() -> PoolConfig {
        PoolConfig::default()
            .with_min_size(2)
            .with_max_size(5)
            .with_sweep_interval(Duration::ZERO)
    }

    #[test]
    fn prewarms_to_minimum() {
        let (pool, created) = counting_pool(small_config());
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn borrow_creates_on_demand_and_return_is_capped() {
        let (pool, created) = counting_pool(small_config());
        let guards: Vec<_> = (0..8).map(|_| pool.borrow()).collect();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(created.load(Ordering::SeqCst), 8);
        drop(guards);
        assert_eq!(pool.idle_count(), 5);

        for _ in 0..3 {
            let _a = pool.borrow();
            let _b = pool.borrow();
        }
        assert!(pool.idle_count() <= 5);
    }

    #[test]
    fn concurrent_borrowers_share_the_pool() {
        let pool = EvaluatorPool::with_grid_evaluators(small_config());
        std::thread::scope(|scope| {
            for worker in 0..8i64 {
                let pool = &pool;
                scope.spawn(move || {
                    let record = Record::new().with_field("n", worker);
                    for _ in 0..50 {
                        let held = pool.borrow();
                        assert_eq!(pool.evaluate("=n+1", &record).unwrap().text, (worker + 1).to_string());
                        drop(held);
                        assert!(pool.idle_count() <= 5);
                    }
                });
            }
        });
        assert!(pool.idle_count() <= 5);
        assert!(pool.idle_count() >= 2);
    }

    #[test]
    fn sweep_keeps_minimum_and_recent_evaluators() {
        let (pool, _) = counting_pool(small_config());
        let guards: Vec<_> = (0..5).map(|_| pool.borrow()).collect();
        drop(guards);
        assert_eq!(pool.idle_count(), 5);

        assert_eq!(pool.sweep_at(Instant::now()), 0);
        let later = Instant::now() + Duration::from_secs(11 * 60);
        assert_eq!(pool.sweep_at(later), 3);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.sweep_at(later), 0);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn pooled_evaluators_compute() {
        let pool = EvaluatorPool::with_grid_evaluators(small_config());
        let record = Record::new().with_field("qty", 4i64);
        assert_eq!(pool.evaluate("=qty*2", &record).unwrap().text, "8");
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn shutdown_stops_sweeper_and_is_idempotent() {
        let (pool, _) = counting_pool(small_config().with_sweep_interval(Duration::from_secs(300)));
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.borrow().evaluate("=1+1", &Record::new()).unwrap().text, "2");
    }

    #[test]
    fn config_reads_from_json_with_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"max_size": 4}"#).unwrap();
        assert_eq!(config.max_size, 4);
        assert_eq!(config.min_size, 2);
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));

        let config: PoolConfig =
            serde_json::from_str(r#"{"sweep_interval_secs": 30, "idle_timeout_secs": 90}"#).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(90));
    }
}
