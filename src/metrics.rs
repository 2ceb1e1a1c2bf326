//! Execution counters for the rewrite machine.
//!
//! All counters use relaxed ordering. Values read while workers are still
//! running may lag; a report taken after a run completes is exact.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MachineMetrics {
    steps: AtomicU64,
    match_attempts: AtomicU64,
    match_failures: AtomicU64,
    binding_conflicts: AtomicU64,
    undecided_matches: AtomicU64,
    fresh_requests: AtomicU64,
    oracle_calls: AtomicU64,
    function_evals: AtomicU64,
}

/// Point-in-time copy of `MachineMetrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub steps: u64,
    pub match_attempts: u64,
    pub match_failures: u64,
    pub binding_conflicts: u64,
    pub undecided_matches: u64,
    pub fresh_requests: u64,
    pub oracle_calls: u64,
    pub function_evals: u64,
}

impl MachineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_match_attempt(&self) {
        self.match_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_match_failure(&self) {
        self.match_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_binding_conflicts(&self, n: u64) {
        if n > 0 {
            self.binding_conflicts.fetch_add(n, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_undecided(&self) {
        self.undecided_matches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fresh(&self) {
        self.fresh_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_oracle_call(&self) {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_function_eval(&self) {
        self.function_evals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            steps: self.steps.load(Ordering::Relaxed),
            match_attempts: self.match_attempts.load(Ordering::Relaxed),
            match_failures: self.match_failures.load(Ordering::Relaxed),
            binding_conflicts: self.binding_conflicts.load(Ordering::Relaxed),
            undecided_matches: self.undecided_matches.load(Ordering::Relaxed),
            fresh_requests: self.fresh_requests.load(Ordering::Relaxed),
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            function_evals: self.function_evals.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_report_zero() {
        assert_eq!(MachineMetrics::new().report(), MetricsReport::default());
    }

    #[test]
    fn counters_accumulate() {
        let m = MachineMetrics::new();
        m.record_step();
        m.record_step();
        m.record_binding_conflicts(3);
        m.record_binding_conflicts(0);
        let r = m.report();
        assert_eq!(r.steps, 2);
        assert_eq!(r.binding_conflicts, 3);
    }

    #[test]
    fn report_serializes() {
        let json = serde_json::to_string(&MachineMetrics::new().report()).unwrap();
        assert!(json.contains("\"steps\":0"));
    }
}
