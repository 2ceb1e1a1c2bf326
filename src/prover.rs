//! Reachability proof search.
//!
//! A `Goal` asks whether every rewrite path from `original` reaches `target`.
//! The prover grows a proof tree level by level from the root. Each open leaf
//! is closed when it matches the target, closed by circularity when an already
//! expanded node subsumes it, or expanded through a symbolic step. A leaf with
//! no successors is a counterexample. When the successors of a leaf cover only
//! part of its states, the uncovered part becomes a remainder leaf of its own.
//!
//! Leaves of one level are examined against a snapshot of the tree, possibly in
//! parallel, and the results are merged in node order under the tree's write
//! lock. Oracle calls never run under that lock. Given fixed rule order and
//! fixed oracle answers the resulting tree does not depend on the worker count.

use crate::definition::RuleId;
use crate::error::Result;
use crate::machine::{RewriteMachine, SymbolicStep};
use crate::oracle::{ConstrainedTerm, Decision};
use crate::scheduler::ExpansionPool;
use crate::symbol::SymbolStore;
use crate::term::format_term;
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::{debug, debug_span, info, warn};

/// Node identifier, assigned in creation order and never reused.
pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternNode {
    pub id: NodeId,
    pub state: ConstrainedTerm,
    /// Distance from the root.
    pub depth: usize,
    /// The node this one descends from through remainder transitions only;
    /// its own id for the root and for rule successors.
    pub base: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Justification {
    Rule(RuleId),
    /// The source leaf is an instance of the destination node.
    Circularity,
    /// The destination is the source under the negation of the guards of its
    /// rule transitions.
    Remainder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProofTransition {
    pub from: NodeId,
    pub to: NodeId,
    pub by: Justification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Open,
    Expanded,
    /// Expanded, but some candidate rule was undecided.
    Partial,
    /// Closed: matches the target.
    Target,
    /// Closed: subsumed by the given expanded node.
    Circular(NodeId),
    /// No successors and not the target.
    Failed,
    /// No successors found, but some candidate rule was undecided.
    Undecided,
}

impl NodeStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, NodeStatus::Target | NodeStatus::Circular(_))
    }

    pub fn is_expanded(self) -> bool {
        matches!(self, NodeStatus::Expanded | NodeStatus::Partial)
    }
}

/// Append-only proof graph. Node ids equal their insertion index.
#[derive(Debug, Clone, Default)]
pub struct ProofTree {
    nodes: Vec<PatternNode>,
    status: Vec<NodeStatus>,
    edges: Vec<ProofTransition>,
    outgoing: HashMap<NodeId, Vec<usize>>,
}

impl ProofTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, state: ConstrainedTerm, depth: usize) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.push(PatternNode {
            id,
            state,
            depth,
            base: id,
        })
    }

    /// Add the remainder of `parent`, which shares the parent's base.
    pub fn add_remainder(&mut self, parent: NodeId, state: ConstrainedTerm, depth: usize) -> NodeId {
        let id = self.nodes.len() as NodeId;
        let base = self.node(parent).map_or(id, |p| p.base);
        self.push(PatternNode {
            id,
            state,
            depth,
            base,
        })
    }

    fn push(&mut self, node: PatternNode) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        self.status.push(NodeStatus::Open);
        id
    }

    pub fn add_transition(&mut self, from: NodeId, to: NodeId, by: Justification) {
        self.outgoing.entry(from).or_default().push(self.edges.len());
        self.edges.push(ProofTransition { from, to, by });
    }

    pub fn node(&self, id: NodeId) -> Option<&PatternNode> {
        self.nodes.get(id as usize)
    }

    pub fn status(&self, id: NodeId) -> Option<NodeStatus> {
        self.status.get(id as usize).copied()
    }

    fn set_status(&mut self, id: NodeId, status: NodeStatus) {
        if let Some(slot) = self.status.get_mut(id as usize) {
            *slot = status;
        }
    }

    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ProofTransition] {
        &self.edges
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &ProofTransition> + '_ {
        self.outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that were never expanded, closed or not.
    pub fn leaves(&self) -> impl Iterator<Item = &PatternNode> + '_ {
        self.nodes
            .iter()
            .zip(&self.status)
            .filter(|(_, s)| !s.is_expanded())
            .map(|(n, _)| n)
    }

    /// Every node is fully expanded or closed.
    pub fn is_complete(&self) -> bool {
        self.status
            .iter()
            .all(|s| *s == NodeStatus::Expanded || s.is_closed())
    }

    pub fn open_leaves(&self) -> impl Iterator<Item = &PatternNode> + '_ {
        self.nodes
            .iter()
            .zip(&self.status)
            .filter(|(_, s)| **s == NodeStatus::Open)
            .map(|(n, _)| n)
    }

    fn expanded(&self) -> Vec<PatternNode> {
        self.nodes
            .iter()
            .zip(&self.status)
            .filter(|(_, s)| s.is_expanded())
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn snapshot(&self, symbols: &SymbolStore) -> ProofTreeSnapshot {
        ProofTreeSnapshot {
            nodes: self
                .nodes
                .iter()
                .zip(&self.status)
                .map(|(n, s)| NodeSnapshot {
                    id: n.id,
                    depth: n.depth,
                    status: *s,
                    term: format_term(&n.state.term, symbols),
                    condition: n
                        .state
                        .condition
                        .conjuncts()
                        .iter()
                        .map(|c| format_term(c, symbols))
                        .collect(),
                })
                .collect(),
            edges: self.edges.clone(),
        }
    }

    pub fn to_json(&self, symbols: &SymbolStore) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot(symbols))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub depth: usize,
    pub status: NodeStatus,
    pub term: String,
    pub condition: Vec<String>,
}

/// Rendered, serializable view of a proof tree.
#[derive(Debug, Clone, Serialize)]
pub struct ProofTreeSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<ProofTransition>,
}

/// One reachability obligation.
#[derive(Debug)]
pub struct Goal {
    original: ConstrainedTerm,
    target: ConstrainedTerm,
    proved: bool,
    tree: Arc<RwLock<ProofTree>>,
}

impl Goal {
    /// A goal whose tree holds just the root, `original`.
    pub fn new(original: impl Into<ConstrainedTerm>, target: impl Into<ConstrainedTerm>) -> Self {
        let original = original.into();
        let mut tree = ProofTree::new();
        tree.add_node(original.clone(), 0);
        Self {
            original,
            target: target.into(),
            proved: false,
            tree: Arc::new(RwLock::new(tree)),
        }
    }

    pub fn original(&self) -> &ConstrainedTerm {
        &self.original
    }

    pub fn target(&self) -> &ConstrainedTerm {
        &self.target
    }

    pub fn is_proved(&self) -> bool {
        self.proved
    }

    pub fn tree(&self) -> RwLockReadGuard<'_, ProofTree> {
        self.tree.read()
    }

    /// Shared handle for observers that inspect the tree while a search runs.
    pub fn tree_handle(&self) -> Arc<RwLock<ProofTree>> {
        Arc::clone(&self.tree)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofStatus {
    Proved,
    /// A failure leaf was found.
    Disproved,
    /// Budget, cancellation or undecided branches left the goal open.
    Inconclusive,
}

#[derive(Debug, Clone)]
pub struct ProverConfig {
    pub max_nodes: usize,
    /// Leaves deeper than this stay open.
    pub max_depth: usize,
    pub workers: usize,
    /// Levels with fewer open leaves than this are examined inline.
    pub parallel_threshold: usize,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            max_nodes: 10_000,
            max_depth: 256,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            parallel_threshold: 4,
        }
    }
}

/// Cooperative cancellation shared between a driver and a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProverStats {
    pub levels: usize,
    pub expanded: usize,
    pub closed_by_target: usize,
    pub closed_by_circularity: usize,
    pub failures: usize,
    pub undecided: usize,
    pub nodes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProofReport {
    pub status: ProofStatus,
    pub stats: ProverStats,
}

enum Examination {
    Target,
    Circular(NodeId),
    Expanded(SymbolicStep),
    Skipped,
}

pub struct Prover {
    machine: RewriteMachine,
    config: ProverConfig,
    cancel: CancelToken,
    pool: ExpansionPool,
}

impl Prover {
    pub fn new(machine: RewriteMachine) -> Self {
        Self::with_config(machine, ProverConfig::default())
    }

    pub fn with_config(machine: RewriteMachine, config: ProverConfig) -> Self {
        let pool = ExpansionPool::new(config.workers);
        Self {
            machine,
            config,
            cancel: CancelToken::new(),
            pool,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn machine(&self) -> &RewriteMachine {
        &self.machine
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    /// Search for a proof of `goal`, continuing from whatever tree it holds.
    ///
    /// Running out of budget or being cancelled is not an error: the goal
    /// keeps its partial tree and the report says `Inconclusive`.
    pub fn prove(&self, goal: &mut Goal) -> Result<ProofReport> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("prove").entered();

        let mut stats = ProverStats::default();
        if goal.proved {
            stats.nodes = goal.tree().len();
            return Ok(ProofReport {
                status: ProofStatus::Proved,
                stats,
            });
        }

        let tree = goal.tree_handle();
        let target = goal.target.clone();
        let mut visited = tree.read().expanded();
        let mut frontier: Vec<PatternNode> = tree.read().open_leaves().cloned().collect();
        let mut incomplete = false;
        let mut failed = false;

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                incomplete = true;
                break;
            }
            stats.levels += 1;

            let (within, beyond): (Vec<PatternNode>, Vec<PatternNode>) = frontier
                .into_iter()
                .partition(|n| n.depth <= self.config.max_depth);
            if !beyond.is_empty() {
                #[cfg(feature = "tracing")]
                warn!(leaves = beyond.len(), "depth budget exhausted");
                incomplete = true;
            }

            let examine = |node: &PatternNode| self.examine(node, &target, &visited);
            let results: Vec<Option<Result<Examination>>> =
                if self.pool.threads() > 1 && within.len() >= self.config.parallel_threshold {
                    self.pool.map(&within, self.cancel.flag(), examine)
                } else {
                    within
                        .iter()
                        .map(|node| {
                            if self.cancel.is_cancelled() {
                                None
                            } else {
                                Some(examine(node))
                            }
                        })
                        .collect()
                };

            let mut next: Vec<NodeId> = Vec::new();
            let mut newly_expanded: Vec<PatternNode> = Vec::new();
            {
                let mut tree = tree.write();
                for (node, result) in within.iter().zip(results) {
                    let examination = match result {
                        Some(result) => result?,
                        None => Examination::Skipped,
                    };
                    match examination {
                        Examination::Skipped => incomplete = true,
                        Examination::Target => {
                            #[cfg(feature = "tracing")]
                            debug!(node = node.id, "closed by target");
                            tree.set_status(node.id, NodeStatus::Target);
                            stats.closed_by_target += 1;
                        }
                        Examination::Circular(by) => {
                            #[cfg(feature = "tracing")]
                            debug!(node = node.id, by, "closed by circularity");
                            tree.set_status(node.id, NodeStatus::Circular(by));
                            tree.add_transition(node.id, by, Justification::Circularity);
                            stats.closed_by_circularity += 1;
                        }
                        Examination::Expanded(step) if step.successors.is_empty() => {
                            if step.undecided > 0 {
                                tree.set_status(node.id, NodeStatus::Undecided);
                                stats.undecided += 1;
                                incomplete = true;
                            } else {
                                #[cfg(feature = "tracing")]
                                debug!(node = node.id, "failure leaf");
                                tree.set_status(node.id, NodeStatus::Failed);
                                stats.failures += 1;
                                failed = true;
                            }
                        }
                        Examination::Expanded(step) => {
                            // All successors go in or none does; the node stays
                            // open for a later search with a larger budget.
                            let needed = step.successors.len() + usize::from(step.remainder.is_some());
                            if tree.len() + needed > self.config.max_nodes {
                                #[cfg(feature = "tracing")]
                                warn!(node = node.id, nodes = self.config.max_nodes, "node budget exhausted");
                                incomplete = true;
                                continue;
                            }
                            if step.undecided > 0 {
                                tree.set_status(node.id, NodeStatus::Partial);
                                stats.undecided += 1;
                                incomplete = true;
                            } else {
                                tree.set_status(node.id, NodeStatus::Expanded);
                            }
                            stats.expanded += 1;
                            for succ in step.successors {
                                let id = tree.add_node(succ.state, node.depth + 1);
                                tree.add_transition(node.id, id, Justification::Rule(succ.rule));
                                next.push(id);
                            }
                            if let Some(rest) = step.remainder {
                                let id = tree.add_remainder(node.id, rest, node.depth + 1);
                                tree.add_transition(node.id, id, Justification::Remainder);
                                next.push(id);
                            }
                            newly_expanded.push(node.clone());
                        }
                    }
                }
            }
            visited.extend(newly_expanded);

            if failed {
                break;
            }
            let tree = tree.read();
            frontier = next.iter().filter_map(|id| tree.node(*id).cloned()).collect();
        }

        let complete = goal.tree().is_complete();
        let status = if failed {
            ProofStatus::Disproved
        } else if incomplete || !complete {
            ProofStatus::Inconclusive
        } else {
            goal.proved = true;
            ProofStatus::Proved
        };
        stats.nodes = goal.tree().len();

        #[cfg(feature = "tracing")]
        info!(?status, nodes = stats.nodes, levels = stats.levels, "proof search finished");
        Ok(ProofReport { status, stats })
    }

    fn examine(
        &self,
        node: &PatternNode,
        target: &ConstrainedTerm,
        visited: &[PatternNode],
    ) -> Result<Examination> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("expand_leaf", node = node.id).entered();

        if self.cancel.is_cancelled() {
            return Ok(Examination::Skipped);
        }
        if self.covers(target, &node.state) {
            return Ok(Examination::Target);
        }
        // A remainder has taken no rule step since the nodes of its own base,
        // so those cannot close it.
        for earlier in visited.iter().filter(|e| e.base != node.base) {
            if self.covers(&earlier.state, &node.state) {
                return Ok(Examination::Circular(earlier.id));
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(Examination::Skipped);
        }
        Ok(Examination::Expanded(self.machine.step_symbolic(&node.state)?))
    }

    /// `state` is an instance of `pattern` whose path condition implies the
    /// instantiated condition of `pattern`.
    fn covers(&self, pattern: &ConstrainedTerm, state: &ConstrainedTerm) -> bool {
        let matches = self
            .machine
            .matcher()
            .match_pattern(&pattern.term, &state.term)
            .matches;
        for m in matches {
            let mut needed = pattern.condition.apply_subst(&m.subst);
            for c in m.constraints.conjuncts() {
                needed.assume(c.clone());
            }
            if needed.is_trivial() {
                return true;
            }
            if self.cancel.is_cancelled() {
                return false;
            }
            self.machine.metrics().record_oracle_call();
            if self.machine.oracle().implies(&state.condition, &needed) == Decision::True {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "tests/prover.rs"]
mod tests;
