//! Work-stealing pool used to examine the leaves of one proof-search level in
//! parallel.
//!
//! Every item index is queued on a global injector up front; workers drain
//! their local FIFO, then steal in batches from the injector and from each
//! other. Results travel back over a channel tagged with their index, so the
//! caller always sees them in item order whatever the interleaving was.

use crossbeam_channel::unbounded;
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

#[derive(Debug, Default)]
pub struct PoolMetrics {
    batches: AtomicU64,
    tasks: AtomicU64,
    steals: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetricsSnapshot {
    pub batches: u64,
    pub tasks: u64,
    pub steals: u64,
}

impl PoolMetrics {
    fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    fn record_task(&self) {
        self.tasks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_steal(&self) {
        self.steals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            tasks: self.tasks.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct ExpansionPool {
    threads: usize,
    metrics: PoolMetrics,
}

impl ExpansionPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            metrics: PoolMetrics::default(),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Apply `f` to every item; results come back in item order.
    ///
    /// Items not yet started when `cancelled` is raised yield `None`.
    pub fn map<T, R, F>(&self, items: &[T], cancelled: &AtomicBool, f: F) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        self.metrics.record_batch();
        if self.threads == 1 || items.len() <= 1 {
            return items
                .iter()
                .map(|item| {
                    if cancelled.load(Ordering::Acquire) {
                        return None;
                    }
                    self.metrics.record_task();
                    Some(f(item))
                })
                .collect();
        }

        let injector = Injector::new();
        for i in 0..items.len() {
            injector.push(i);
        }
        let threads = self.threads.min(items.len());
        let mut workers = Vec::with_capacity(threads);
        let mut stealers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let worker = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers.push(worker);
        }

        let (tx, rx) = unbounded();
        thread::scope(|scope| {
            for worker in workers {
                let tx = tx.clone();
                let injector = &injector;
                let stealers = &stealers;
                let f = &f;
                let metrics = &self.metrics;
                scope.spawn(move || loop {
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(i) = worker
                        .pop()
                        .or_else(|| steal_index(&worker, injector, stealers, metrics))
                    else {
                        break;
                    };
                    metrics.record_task();
                    if tx.send((i, f(&items[i]))).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut out: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
        for (i, result) in rx.try_iter() {
            out[i] = Some(result);
        }
        out
    }
}

fn steal_index(
    worker: &Worker<usize>,
    injector: &Injector<usize>,
    stealers: &[Stealer<usize>],
    metrics: &PoolMetrics,
) -> Option<usize> {
    loop {
        match injector.steal_batch_and_pop(worker) {
            Steal::Success(i) => return Some(i),
            Steal::Retry => continue,
            Steal::Empty => break,
        }
    }

    for stealer in stealers {
        loop {
            match stealer.steal_batch_and_pop(worker) {
                Steal::Success(i) => {
                    metrics.record_steal();
                    return Some(i);
                }
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_item_order() {
        let pool = ExpansionPool::new(4);
        let items: Vec<u64> = (0..100).collect();
        let out = pool.map(&items, &AtomicBool::new(false), |x| x * 2);
        let doubled: Vec<u64> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(doubled, (0..100).map(|x| x * 2).collect::<Vec<_>>());
        assert_eq!(pool.metrics().tasks, 100);
    }

    #[test]
    fn single_thread_runs_inline() {
        let pool = ExpansionPool::new(1);
        let out = pool.map(&[1, 2, 3], &AtomicBool::new(false), |x| x + 1);
        assert_eq!(out, vec![Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn cancelled_before_start_yields_nothing() {
        let pool = ExpansionPool::new(2);
        let out = pool.map(&[1, 2, 3], &AtomicBool::new(true), |x| x + 1);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn zero_threads_is_clamped() {
        assert_eq!(ExpansionPool::new(0).threads(), 1);
    }
}
