//! The rewrite machine: rule application, single steps, runs and search.
//!
//! A machine is a cheap handle over a shared `Definition`, a shared
//! `RunContext` and a decision oracle. Cloning it shares all three, which is
//! how proof-search workers rewrite different leaves of one run in parallel.

use crate::definition::{Definition, Rule, RuleId};
use crate::error::{Result, RewriteError};
use crate::fresh::{fresh, fresh_at, FreshCounter};
use crate::matching::{Matcher, Matches};
use crate::metrics::MachineMetrics;
use crate::oracle::{ConstrainedTerm, Decision, DecisionOracle, PathCondition, Refinement};
use crate::subst::ExtendedSubstitution;
use crate::symbol::{Label, Sort, SymbolStore};
use crate::term::{Cell, CellCollection, Term};
use hashbrown::HashSet;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::{debug, debug_span, trace};

/// State owned by one run: the fresh counter. Shared by every branch and
/// worker of the run, never by two runs.
#[derive(Debug, Default)]
pub struct RunContext {
    counter: FreshCounter,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(counter: FreshCounter) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &FreshCounter {
        &self.counter
    }
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Nesting limit for function evaluation.
    pub max_function_depth: usize,
    /// During symbolic steps, branch on a side condition the oracle cannot
    /// decide by assuming it. When false such branches count as undecided.
    pub symbolic_side_conditions: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_function_depth: 256,
            symbolic_side_conditions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Rewrote { rule: RuleId, term: Term },
    /// No rule applies: a valid halt.
    Stuck,
    /// A candidate rule could be neither applied nor ruled out.
    Undecided,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor {
    pub rule: RuleId,
    pub state: ConstrainedTerm,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolicStep {
    pub successors: Vec<Successor>,
    /// Matches or side conditions that could be neither applied nor ruled out.
    pub undecided: usize,
    /// The input state under the negation of every successor's guard: the
    /// states no successor covers. `None` when some successor is unguarded or
    /// the oracle refutes the remaining condition.
    pub remainder: Option<ConstrainedTerm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaltReason {
    /// At least one step was taken and no rule applies any more.
    Fixpoint,
    BoundExhausted,
    /// No step could be taken from the initial term.
    Stuck,
    /// A candidate rule could be neither applied nor ruled out.
    Undecided,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub term: Term,
    pub steps: usize,
    pub reason: HaltReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub rule: RuleId,
    pub name: Option<String>,
    pub term: Term,
}

#[derive(Debug, Clone)]
pub struct TracedRun {
    pub result: RunResult,
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_solutions: Option<usize>,
    pub max_depth: Option<usize>,
    /// Cap on distinct states visited.
    pub max_states: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_solutions: None,
            max_depth: None,
            max_states: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub state: Term,
    pub subst: ExtendedSubstitution,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub solutions: Vec<Solution>,
    /// Distinct states examined.
    pub states: usize,
    /// False when a limit cut the search short.
    pub complete: bool,
}

enum Condition {
    Holds,
    Fails,
    Assume(Term),
    Undecided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Right-hand sides: cells take the identity of the subject cell they
    /// rewrite, or a new identity.
    Instantiate,
    /// Existing terms: cells keep their identity.
    Evaluate,
}

#[derive(Clone)]
pub struct RewriteMachine {
    def: Arc<Definition>,
    ctx: Arc<RunContext>,
    oracle: Arc<dyn DecisionOracle>,
    config: MachineConfig,
    metrics: Arc<MachineMetrics>,
}

impl RewriteMachine {
    /// A machine with a fresh run context and no oracle.
    pub fn new(def: Arc<Definition>) -> Self {
        Self {
            def,
            ctx: Arc::new(RunContext::new()),
            oracle: Arc::new(()),
            config: MachineConfig::default(),
            metrics: Arc::new(MachineMetrics::new()),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn DecisionOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_context(mut self, ctx: Arc<RunContext>) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn definition(&self) -> &Definition {
        &self.def
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn symbols(&self) -> &SymbolStore {
        self.def.symbols()
    }

    pub fn oracle(&self) -> &dyn DecisionOracle {
        self.oracle.as_ref()
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MachineMetrics {
        &self.metrics
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.def)
    }

    pub fn match_rule(&self, rule: &Rule, subject: &Term) -> Matches {
        self.match_rule_under(rule, subject, &PathCondition::new())
    }

    pub fn match_rule_under(&self, rule: &Rule, subject: &Term, path: &PathCondition) -> Matches {
        self.matcher()
            .match_rule(rule, subject, path, self.oracle.as_ref(), &self.metrics)
    }

    /// Build the rule's right-hand side under `subst`.
    ///
    /// Fresh variables are bound first, function applications are evaluated
    /// eagerly, and cells in the write set are rebuilt under their subject
    /// identity. Cells reached through a rest variable are carried over as the
    /// same `Arc`.
    pub fn apply_rule(&self, rule: &Rule, subst: &ExtendedSubstitution) -> Result<Term> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("apply_rule", rule = rule.id).entered();

        let mut subst = subst.clone();
        self.bind_fresh(rule, &mut subst, 0)?;
        self.build(&rule.rhs, &subst, Mode::Instantiate, 0)
    }

    /// Evaluate every function application in `term`.
    pub fn evaluate(&self, term: &Term) -> Result<Term> {
        self.evaluate_at(term, 0)
    }

    pub(crate) fn evaluate_at(&self, term: &Term, depth: usize) -> Result<Term> {
        self.build(term, &ExtendedSubstitution::new(), Mode::Evaluate, depth)
    }

    pub fn fresh(&self, sort: Sort) -> Result<Term> {
        fresh(sort, self)
    }

    /// Concrete step: the first applicable rule in (priority, declaration)
    /// order. An undecided candidate blocks every later one.
    pub fn step(&self, subject: &Term) -> Result<StepResult> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("step").entered();

        let empty = PathCondition::new();
        for rule in self.def.candidates(subject) {
            let matches = self.match_rule_under(rule, subject, &empty);
            for m in &matches {
                if !m.condition.is_trivial() {
                    return Ok(StepResult::Undecided);
                }
                match self.side_condition(rule, &m.subst, None, 0)? {
                    Condition::Holds => {
                        let term = self.apply_rule(rule, &m.subst)?;
                        self.metrics.record_step();
                        #[cfg(feature = "tracing")]
                        trace!(rule = rule.id, "rewrote");
                        return Ok(StepResult::Rewrote { rule: rule.id, term });
                    }
                    Condition::Fails => {}
                    Condition::Assume(_) | Condition::Undecided => return Ok(StepResult::Undecided),
                }
            }
            if matches.undecided() > 0 {
                #[cfg(feature = "tracing")]
                debug!(rule = rule.id, "undecided match");
                return Ok(StepResult::Undecided);
            }
        }
        Ok(StepResult::Stuck)
    }

    /// Symbolic step: every applicable (rule, match) pair, each successor
    /// guarded by its own path condition.
    ///
    /// A successor that needed a match constraint or an assumed side
    /// condition covers only part of `state`. The rest is returned as the
    /// remainder so that no branch of the input disappears.
    pub fn step_symbolic(&self, state: &ConstrainedTerm) -> Result<SymbolicStep> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("step_symbolic").entered();

        let mut out = SymbolicStep::default();
        let mut guards: Vec<PathCondition> = Vec::new();
        for rule in self.def.candidates(&state.term) {
            let matches = self.match_rule_under(rule, &state.term, &state.condition);
            out.undecided += matches.undecided();
            for m in matches {
                let mut guard = m.condition;
                let path = state.condition.and(&guard);
                match self.side_condition(rule, &m.subst, Some(&path), 0)? {
                    Condition::Holds => {}
                    Condition::Fails => continue,
                    Condition::Assume(cond) => guard.assume(cond),
                    Condition::Undecided => {
                        out.undecided += 1;
                        continue;
                    }
                }
                let term = self.apply_rule(rule, &m.subst)?;
                self.metrics.record_step();
                out.successors.push(Successor {
                    rule: rule.id,
                    state: ConstrainedTerm::with_condition(term, state.condition.and(&guard)),
                });
                guards.push(guard);
            }
        }

        if !guards.is_empty() && guards.iter().all(|g| !g.is_trivial()) {
            let mut rest = state.condition.clone();
            for guard in &guards {
                rest.assume(self.negation(guard));
            }
            self.metrics.record_oracle_call();
            match self.oracle.refine(&ExtendedSubstitution::new(), &rest) {
                Refinement::Unsat => {}
                // The guards add nothing the path does not already deny, so the
                // uncovered states cannot be split off.
                _ if rest == state.condition => out.undecided += 1,
                _ => out.remainder = Some(ConstrainedTerm::with_condition(state.term.clone(), rest)),
            }
        }
        Ok(out)
    }

    /// Every concrete successor of `subject`, across all rules and matches.
    pub fn successors(&self, subject: &Term) -> Result<Vec<(RuleId, Term)>> {
        let empty = PathCondition::new();
        let mut out = Vec::new();
        for rule in self.def.candidates(subject) {
            for m in self.match_rule_under(rule, subject, &empty) {
                if !m.condition.is_trivial() {
                    continue;
                }
                if let Condition::Holds = self.side_condition(rule, &m.subst, None, 0)? {
                    out.push((rule.id, self.apply_rule(rule, &m.subst)?));
                }
            }
        }
        Ok(out)
    }

    /// Step until no rule applies or `bound` steps have been taken.
    pub fn run(&self, subject: &Term, bound: Option<usize>) -> Result<RunResult> {
        self.run_with(subject, bound, |_, _| {})
    }

    /// `run`, recording every step.
    pub fn run_traced(&self, subject: &Term, bound: Option<usize>) -> Result<TracedRun> {
        let mut steps = Vec::new();
        let result = self.run_with(subject, bound, |rule, term| {
            steps.push(TraceStep {
                rule,
                name: self.def.rule(rule).and_then(|r| r.name.clone()),
                term: term.clone(),
            })
        })?;
        Ok(TracedRun { result, steps })
    }

    fn run_with(&self, subject: &Term, bound: Option<usize>, mut on_step: impl FnMut(RuleId, &Term)) -> Result<RunResult> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("run", ?bound).entered();

        let mut term = subject.clone();
        let mut steps = 0;
        let reason = loop {
            if bound.map_or(false, |b| steps >= b) {
                break HaltReason::BoundExhausted;
            }
            match self.step(&term)? {
                StepResult::Rewrote { rule, term: next } => {
                    on_step(rule, &next);
                    term = next;
                    steps += 1;
                }
                StepResult::Stuck if steps > 0 => break HaltReason::Fixpoint,
                StepResult::Stuck => break HaltReason::Stuck,
                StepResult::Undecided => {
                    #[cfg(feature = "tracing")]
                    debug!(steps, "run halted on an undecided match");
                    break HaltReason::Undecided;
                }
            }
        };

        #[cfg(feature = "tracing")]
        debug!(steps, ?reason, "run finished");
        Ok(RunResult {
            term,
            steps,
            reason,
        })
    }

    /// Breadth-first search of the concrete state space for states matching
    /// `pattern`. Visited states are deduplicated structurally.
    pub fn search(&self, subject: &Term, pattern: &Term, config: &SearchConfig) -> Result<SearchResult> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("search").entered();

        let matcher = self.matcher();
        let mut result = SearchResult::default();
        let mut seen: HashSet<Term> = HashSet::new();
        let mut queue: VecDeque<(Term, usize)> = VecDeque::new();
        let mut truncated = false;
        seen.insert(subject.clone());
        queue.push_back((subject.clone(), 0));

        while let Some((term, depth)) = queue.pop_front() {
            result.states += 1;
            for subst in matcher.concrete_matches(pattern, &term) {
                result.solutions.push(Solution {
                    state: term.clone(),
                    subst,
                    depth,
                });
                if config
                    .max_solutions
                    .map_or(false, |max| result.solutions.len() >= max)
                {
                    return Ok(result);
                }
            }

            let next = self.successors(&term)?;
            if config.max_depth.map_or(false, |max| depth >= max) {
                truncated |= !next.is_empty();
                continue;
            }
            for (_, succ) in next {
                if seen.contains(&succ) {
                    continue;
                }
                if seen.len() >= config.max_states {
                    truncated = true;
                    break;
                }
                seen.insert(succ.clone());
                queue.push_back((succ, depth + 1));
            }
        }

        result.complete = !truncated;
        Ok(result)
    }

    fn bind_fresh(&self, rule: &Rule, subst: &mut ExtendedSubstitution, depth: usize) -> Result<()> {
        for var in rule.fresh_vars() {
            if subst.is_bound(var) {
                continue;
            }
            let value = fresh_at(var.sort, self, depth)?;
            subst.bind_if_unbound(*var, value);
        }
        Ok(())
    }

    /// `notBool` of the conjunction of `guard`.
    fn negation(&self, guard: &PathCondition) -> Term {
        let known = self.symbols().known();
        let mut conjuncts = guard.conjuncts().iter().cloned();
        let first = conjuncts.next().unwrap_or_else(|| Term::bool(self.symbols(), true));
        let all = conjuncts.fold(first, |acc, c| Term::app(known.and_bool, vec![acc, c]));
        Term::app(known.not_bool, vec![all])
    }

    fn side_condition(
        &self,
        rule: &Rule,
        subst: &ExtendedSubstitution,
        path: Option<&PathCondition>,
        depth: usize,
    ) -> Result<Condition> {
        let Some(requires) = &rule.requires else {
            return Ok(Condition::Holds);
        };
        let cond = self.build(requires, subst, Mode::Evaluate, depth)?;
        match cond.as_bool() {
            Some(true) => return Ok(Condition::Holds),
            Some(false) => return Ok(Condition::Fails),
            None => {}
        }
        let Some(path) = path else {
            return Ok(Condition::Undecided);
        };
        self.metrics.record_oracle_call();
        Ok(match self.oracle.decide(path, &cond) {
            Decision::True => Condition::Holds,
            Decision::False => Condition::Fails,
            Decision::Unknown if self.config.symbolic_side_conditions => Condition::Assume(cond),
            Decision::Unknown => Condition::Undecided,
        })
    }

    fn build(&self, term: &Term, subst: &ExtendedSubstitution, mode: Mode, depth: usize) -> Result<Term> {
        match term {
            Term::Token(_) => Ok(term.clone()),
            Term::Var(v) => Ok(subst.get(v).cloned().unwrap_or_else(|| term.clone())),
            Term::App(app) => {
                let mut args: SmallVec<[Term; 4]> = SmallVec::with_capacity(app.args.len());
                for arg in &app.args {
                    args.push(self.build(arg, subst, mode, depth)?);
                }
                if self.def.is_function(app.label) {
                    self.call_function(app.label, args, depth)
                } else if unchanged(&args, &app.args) {
                    Ok(term.clone())
                } else {
                    Ok(Term::app(app.label, args))
                }
            }
            Term::List(list) => {
                let mut items = Vec::with_capacity(list.items.len());
                for item in &list.items {
                    items.push(self.build(item, subst, mode, depth)?);
                }
                if unchanged(&items, &list.items) {
                    Ok(term.clone())
                } else {
                    Ok(Term::list(list.op, items))
                }
            }
            Term::Cells(coll) => self.build_cells(coll, subst, mode, depth),
        }
    }

    fn build_cells(
        &self,
        coll: &Arc<CellCollection>,
        subst: &ExtendedSubstitution,
        mode: Mode,
        depth: usize,
    ) -> Result<Term> {
        let mut changed = false;
        let mut cells: Vec<Arc<Cell>> = Vec::with_capacity(coll.cells.len());
        for cell in &coll.cells {
            let content = self.build(&cell.content, subst, mode, depth)?;
            let rebuilt = match mode {
                Mode::Evaluate if same_node(&content, &cell.content) => Arc::clone(cell),
                Mode::Evaluate => cell.with_content(content),
                Mode::Instantiate => match subst.target_of(cell.id) {
                    Some(target) => Arc::new(Cell {
                        id: target,
                        name: cell.name,
                        content,
                    }),
                    None => self.def.cell(cell.name, content),
                },
            };
            changed |= !Arc::ptr_eq(&rebuilt, cell);
            cells.push(rebuilt);
        }

        let mut rest = coll.rest;
        if let Some(bound) = coll.rest.as_ref().and_then(|r| subst.get(r)) {
            changed = true;
            match bound {
                Term::Cells(frame) => {
                    cells.extend(frame.cells.iter().cloned());
                    rest = frame.rest;
                }
                Term::Var(v) => rest = Some(*v),
                _ => {}
            }
        }

        if changed {
            Ok(Term::cells(cells, rest))
        } else {
            Ok(Term::Cells(Arc::clone(coll)))
        }
    }

    fn call_function(&self, label: Label, args: SmallVec<[Term; 4]>, depth: usize) -> Result<Term> {
        if depth >= self.config.max_function_depth {
            return Err(RewriteError::FunctionDepthExceeded {
                label: self.symbols().name(label).to_string(),
                depth,
            });
        }
        self.metrics.record_function_eval();

        if let Some(hook) = self.def.decl(label).and_then(|d| d.hook) {
            let result = hook(&args, self.symbols());
            return Ok(result.unwrap_or_else(|| Term::app(label, args)));
        }

        let call = Term::app(label, args);
        let matcher = self.matcher();
        for rule in self.def.function_rules(label) {
            for mut subst in matcher.concrete_matches(&rule.lhs, &call) {
                if !matches!(self.side_condition(rule, &subst, None, depth + 1)?, Condition::Holds) {
                    continue;
                }
                self.bind_fresh(rule, &mut subst, depth + 1)?;
                return self.build(&rule.rhs, &subst, Mode::Instantiate, depth + 1);
            }
        }
        // No function rule applies: the call stays as an irreducible term.
        Ok(call)
    }
}

impl std::fmt::Debug for RewriteMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteMachine")
            .field("definition", &self.def)
            .field("config", &self.config)
            .field("fresh_counter", &self.ctx.counter().peek())
            .finish()
    }
}

/// Shallow identity: the same token, variable or shared node.
fn same_node(a: &Term, b: &Term) -> bool {
    match (a, b) {
        (Term::Token(x), Term::Token(y)) => Arc::ptr_eq(x, y),
        (Term::Var(x), Term::Var(y)) => x == y,
        (Term::App(x), Term::App(y)) => Arc::ptr_eq(x, y),
        (Term::List(x), Term::List(y)) => Arc::ptr_eq(x, y),
        (Term::Cells(x), Term::Cells(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn unchanged(new: &[Term], old: &[Term]) -> bool {
    new.len() == old.len() && new.iter().zip(old).all(|(a, b)| same_node(a, b))
}

#[cfg(test)]
#[path = "tests/machine.rs"]
mod tests;
