//! Fresh Symbol Generator.
//!
//! A fresh value of sort `S` is produced by calling the definition's generator
//! function for `S` on the next counter value, e.g. `freshId(7)`, and
//! evaluating that call like any other function application. The counter lives
//! in the run context and is shared by every branch of the run.

use crate::error::{Result, RewriteError};
use crate::machine::RewriteMachine;
use crate::symbol::{Label, Sort, SymbolStore};
use crate::term::Term;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Sort -> generator function label. Filled while a definition is built,
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FreshNameTable {
    by_sort: HashMap<Sort, Label>,
}

impl FreshNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the generator for `sort`, replacing any earlier one.
    pub fn register(&mut self, sort: Sort, generator: Label) {
        self.by_sort.insert(sort, generator);
    }

    pub fn lookup(&self, sort: Sort) -> Option<Label> {
        self.by_sort.get(&sort).copied()
    }

    pub fn len(&self) -> usize {
        self.by_sort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sort.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sort, Label)> + '_ {
        self.by_sort.iter().map(|(s, l)| (*s, *l))
    }
}

/// Monotonic counter behind fresh values. One fetch-and-increment per request.
#[derive(Debug, Default)]
pub struct FreshCounter {
    next: AtomicU64,
}

impl FreshCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Value the next request will receive.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    pub fn advance(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Produce a fresh value of `sort`.
///
/// Fails with `UnconfiguredFreshFunction` before touching the counter when the
/// definition has no generator for `sort`.
pub fn fresh(sort: Sort, machine: &RewriteMachine) -> Result<Term> {
    fresh_at(sort, machine, 0)
}

/// `fresh` from inside function evaluation at nesting `depth`.
pub(crate) fn fresh_at(sort: Sort, machine: &RewriteMachine, depth: usize) -> Result<Term> {
    let symbols: &SymbolStore = machine.symbols();
    let generator = machine
        .definition()
        .fresh_table()
        .lookup(sort)
        .ok_or_else(|| RewriteError::UnconfiguredFreshFunction {
            sort: symbols.name(sort).to_string(),
        })?;

    let n = machine.context().counter().advance();
    machine.metrics().record_fresh();
    #[cfg(feature = "tracing")]
    trace!(sort = symbols.name(sort), n, "fresh");

    let call = Term::app(generator, vec![Term::int(symbols, n as i64)]);
    machine.evaluate_at(&call, depth)
}

#[cfg(test)]
#[path = "tests/fresh.rs"]
mod tests;
