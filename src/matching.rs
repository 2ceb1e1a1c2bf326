//! One-way matching of rule patterns against subject terms.
//!
//! Pattern variables bind; subject variables are unknown values. When a
//! symbolic subject variable meets a non-variable pattern, the match holds only
//! under an equality, which is recorded as a constraint for the oracle rather
//! than decided here.
//!
//! Matching runs on an explicit worklist of partial states. Every choice point
//! (sequence split, choice of cell) clones the state once per alternative, so
//! all matches come out in a fixed order: shorter rest segments first, subject
//! cells in collection order.

use crate::definition::{Definition, Rule};
use crate::metrics::MachineMetrics;
use crate::oracle::{DecisionOracle, PathCondition, Refinement};
use crate::subst::{apply_subst, ExtendedSubstitution};
use crate::symbol::{KnownSymbols, Label};
use crate::term::{Cell, CellCollection, ListSeq, Term, Variable};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::{debug_span, trace};

/// A structural match of one pattern, before the oracle has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub subst: ExtendedSubstitution,
    /// Equalities the symbolic parts of the subject must satisfy.
    pub constraints: PathCondition,
}

#[derive(Debug, Clone, Default)]
pub struct PatternMatches {
    pub matches: Vec<RawMatch>,
    /// Branches abandoned because matching could not be decided structurally.
    pub undecided: usize,
    /// Branches abandoned on a binding conflict between ground terms.
    pub conflicts: u64,
}

/// One rule match accepted by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub subst: ExtendedSubstitution,
    /// Constraints added by this match on top of the subject's path condition.
    pub condition: PathCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    NoMatch,
    /// No match was found, but at least one branch was undecided.
    Undecided,
}

/// The finite sequence of matches of one rule against one subject.
///
/// Materialized, so callers may take the first, iterate again, or drop it.
#[derive(Debug, Clone, Default)]
pub struct Matches {
    found: Vec<RuleMatch>,
    undecided: usize,
}

impl Matches {
    pub fn iter(&self) -> std::slice::Iter<'_, RuleMatch> {
        self.found.iter()
    }

    pub fn first(&self) -> Option<&RuleMatch> {
        self.found.first()
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn undecided(&self) -> usize {
        self.undecided
    }

    pub fn outcome(&self) -> MatchOutcome {
        if !self.found.is_empty() {
            MatchOutcome::Matched
        } else if self.undecided > 0 {
            MatchOutcome::Undecided
        } else {
            MatchOutcome::NoMatch
        }
    }
}

impl IntoIterator for Matches {
    type Item = RuleMatch;
    type IntoIter = std::vec::IntoIter<RuleMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.found.into_iter()
    }
}

impl<'a> IntoIterator for &'a Matches {
    type Item = &'a RuleMatch;
    type IntoIter = std::slice::Iter<'a, RuleMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.found.iter()
    }
}

#[derive(Clone)]
enum Goal<'p> {
    Term(&'p Term, Term),
    Seq {
        op: Label,
        pats: &'p [Term],
        items: Arc<ListSeq>,
        pos: usize,
    },
    Cells {
        pats: &'p [Arc<Cell>],
        rest: Option<Variable>,
        subject: Arc<CellCollection>,
        taken: SmallVec<[bool; 8]>,
    },
}

#[derive(Clone)]
struct State<'p> {
    subst: ExtendedSubstitution,
    goals: SmallVec<[Goal<'p>; 8]>,
    /// Symbolic-subject goals whose pattern still had unbound variables.
    deferred: SmallVec<[(&'p Term, Term); 2]>,
    constraints: PathCondition,
}

enum Flow {
    Continue,
    Fail,
    Conflict,
    Undecided,
}

enum Admit {
    Yes,
    No,
    Maybe,
}

fn is_rest_var(t: &Term) -> bool {
    matches!(t, Term::Var(v) if v.is_rest())
}

pub struct Matcher<'d> {
    def: &'d Definition,
    known: KnownSymbols,
}

impl<'d> Matcher<'d> {
    pub fn new(def: &'d Definition) -> Self {
        Self {
            def,
            known: *def.symbols().known(),
        }
    }

    /// All structural matches of `pattern` against `subject`.
    pub fn match_pattern(&self, pattern: &Term, subject: &Term) -> PatternMatches {
        let mut out = PatternMatches::default();
        let mut work: Vec<State<'_>> = vec![State {
            subst: ExtendedSubstitution::new(),
            goals: smallvec![Goal::Term(pattern, subject.clone())],
            deferred: SmallVec::new(),
            constraints: PathCondition::new(),
        }];

        while let Some(mut state) = work.pop() {
            match self.drive(&mut state, &mut work) {
                Flow::Continue => out.matches.push(RawMatch {
                    subst: state.subst,
                    constraints: state.constraints,
                }),
                Flow::Fail => {}
                Flow::Conflict => out.conflicts += 1,
                Flow::Undecided => out.undecided += 1,
            }
        }

        #[cfg(feature = "tracing")]
        trace!(
            matches = out.matches.len(),
            undecided = out.undecided,
            conflicts = out.conflicts,
            "match_pattern"
        );
        out
    }

    /// Matches that need no constraint on the subject.
    pub fn concrete_matches(&self, pattern: &Term, subject: &Term) -> Vec<ExtendedSubstitution> {
        self.match_pattern(pattern, subject)
            .matches
            .into_iter()
            .filter(|m| m.constraints.is_trivial())
            .map(|m| m.subst)
            .collect()
    }

    /// Match a rule's left side under `path`, letting the oracle refine or
    /// reject every match that carries constraints.
    pub fn match_rule(
        &self,
        rule: &Rule,
        subject: &Term,
        path: &PathCondition,
        oracle: &dyn DecisionOracle,
        metrics: &MachineMetrics,
    ) -> Matches {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("match_rule", rule = rule.id).entered();

        metrics.record_match_attempt();
        let raw = self.match_pattern(&rule.lhs, subject);
        metrics.record_binding_conflicts(raw.conflicts);

        let mut out = Matches {
            found: Vec::with_capacity(raw.matches.len()),
            undecided: raw.undecided,
        };
        for m in raw.matches {
            if m.constraints.is_trivial() {
                out.found.push(RuleMatch {
                    subst: m.subst,
                    condition: m.constraints,
                });
                continue;
            }
            metrics.record_oracle_call();
            match oracle.refine(&m.subst, &path.and(&m.constraints)) {
                Refinement::Refined(subst) => out.found.push(RuleMatch {
                    subst,
                    condition: m.constraints,
                }),
                Refinement::Unsat => {}
                Refinement::Unknown => out.undecided += 1,
            }
        }

        match out.outcome() {
            MatchOutcome::Matched => {}
            MatchOutcome::NoMatch => metrics.record_match_failure(),
            MatchOutcome::Undecided => metrics.record_undecided(),
        }
        out
    }

    fn drive<'p>(&self, state: &mut State<'p>, work: &mut Vec<State<'p>>) -> Flow {
        loop {
            let goal = match state.goals.pop() {
                Some(goal) => goal,
                None => {
                    if state.deferred.is_empty() {
                        return Flow::Continue;
                    }
                    for (pattern, subject) in std::mem::take(&mut state.deferred) {
                        if !self.constrain(state, pattern, &subject) {
                            return Flow::Undecided;
                        }
                    }
                    continue;
                }
            };
            let flow = match goal {
                Goal::Term(pattern, subject) => self.match_term(state, pattern, subject),
                Goal::Seq {
                    op,
                    pats,
                    items,
                    pos,
                } => self.match_seq(state, work, op, pats, items, pos),
                Goal::Cells {
                    pats,
                    rest,
                    subject,
                    taken,
                } => self.match_cells(state, work, pats, rest, subject, taken),
            };
            if !matches!(flow, Flow::Continue) {
                return flow;
            }
        }
    }

    fn match_term<'p>(&self, state: &mut State<'p>, pattern: &'p Term, subject: Term) -> Flow {
        match (pattern, &subject) {
            (Term::Var(v), _) => self.bind(state, *v, subject.clone()),
            (_, Term::Var(sv)) => {
                if sv.is_rest() || !self.sorts_overlap(pattern, sv) {
                    return if sv.is_rest() { Flow::Undecided } else { Flow::Fail };
                }
                if !self.constrain(state, pattern, &subject) {
                    state.deferred.push((pattern, subject.clone()));
                }
                Flow::Continue
            }
            (Term::Token(a), Term::Token(b)) => {
                if a == b {
                    Flow::Continue
                } else {
                    Flow::Fail
                }
            }
            (Term::App(pa), Term::App(sa)) => {
                if pa.label != sa.label || pa.args.len() != sa.args.len() {
                    return Flow::Fail;
                }
                for (p, s) in pa.args.iter().zip(sa.args.iter()).rev() {
                    state.goals.push(Goal::Term(p, s.clone()));
                }
                Flow::Continue
            }
            (Term::List(pl), _) => {
                let items = match &subject {
                    Term::List(sl) if sl.op == pl.op => Arc::clone(sl),
                    _ => Arc::new(ListSeq {
                        op: pl.op,
                        items: vec![subject.clone()],
                    }),
                };
                state.goals.push(Goal::Seq {
                    op: pl.op,
                    pats: &pl.items,
                    items,
                    pos: 0,
                });
                Flow::Continue
            }
            (Term::Cells(pc), Term::Cells(sc)) => {
                state.goals.push(Goal::Cells {
                    pats: &pc.cells,
                    rest: pc.rest,
                    subject: Arc::clone(sc),
                    taken: SmallVec::from_elem(false, sc.cells.len()),
                });
                Flow::Continue
            }
            _ => Flow::Fail,
        }
    }

    fn match_seq<'p>(
        &self,
        state: &mut State<'p>,
        work: &mut Vec<State<'p>>,
        op: Label,
        pats: &'p [Term],
        items: Arc<ListSeq>,
        pos: usize,
    ) -> Flow {
        let n = items.items.len();
        let Some((first, more)) = pats.split_first() else {
            return if pos == n { Flow::Continue } else { Flow::Fail };
        };

        let v = match first {
            Term::Var(v) if v.is_rest() => *v,
            _ => {
                let Some(item) = items.items.get(pos).cloned() else {
                    return Flow::Fail;
                };
                if is_rest_var(&item) {
                    // One pattern item against a symbolic segment of unknown length.
                    return Flow::Undecided;
                }
                state.goals.push(Goal::Seq {
                    op,
                    pats: more,
                    items,
                    pos: pos + 1,
                });
                state.goals.push(Goal::Term(first, item));
                return Flow::Continue;
            }
        };

        if let Some(bound) = state.subst.get(&v).cloned() {
            let seg: &[Term] = match &bound {
                Term::List(l) if l.op == op => &l.items,
                other => std::slice::from_ref(other),
            };
            if pos + seg.len() > n || items.items[pos..pos + seg.len()] != *seg {
                return Flow::Fail;
            }
            let next = pos + seg.len();
            state.goals.push(Goal::Seq {
                op,
                pats: more,
                items,
                pos: next,
            });
            return Flow::Continue;
        }

        let fixed_after = more.iter().filter(|p| !is_rest_var(p)).count();
        let Some(avail) = n.checked_sub(pos + fixed_after) else {
            return Flow::Fail;
        };
        // With no later rest variable the split is forced.
        let lo = if more.iter().any(is_rest_var) { 0 } else { avail };

        for take in (lo + 1..=avail).rev() {
            let mut alt = state.clone();
            if let Flow::Continue = self.bind_segment(&mut alt, v, &items, pos, take) {
                alt.goals.push(Goal::Seq {
                    op,
                    pats: more,
                    items: Arc::clone(&items),
                    pos: pos + take,
                });
                work.push(alt);
            }
        }
        let flow = self.bind_segment(state, v, &items, pos, lo);
        if let Flow::Continue = flow {
            state.goals.push(Goal::Seq {
                op,
                pats: more,
                items,
                pos: pos + lo,
            });
        }
        flow
    }

    fn bind_segment(&self, state: &mut State<'_>, var: Variable, items: &ListSeq, pos: usize, take: usize) -> Flow {
        let seg = Term::list(items.op, items.items[pos..pos + take].iter().cloned());
        self.bind(state, var, seg)
    }

    fn match_cells<'p>(
        &self,
        state: &mut State<'p>,
        work: &mut Vec<State<'p>>,
        pats: &'p [Arc<Cell>],
        rest: Option<Variable>,
        subject: Arc<CellCollection>,
        taken: SmallVec<[bool; 8]>,
    ) -> Flow {
        let Some((first, more)) = pats.split_first() else {
            let remaining: Vec<Arc<Cell>> = subject
                .cells
                .iter()
                .zip(&taken)
                .filter(|(_, t)| !**t)
                .map(|(c, _)| Arc::clone(c))
                .collect();
            return match rest {
                Some(r) => self.bind(state, r, Term::cells(remaining, subject.rest)),
                None if !remaining.is_empty() => Flow::Fail,
                None if subject.rest.is_some() => Flow::Undecided,
                None => Flow::Continue,
            };
        };

        let candidates: SmallVec<[usize; 4]> = subject
            .cells
            .iter()
            .enumerate()
            .filter(|(i, c)| !taken[*i] && c.name == first.name)
            .map(|(i, _)| i)
            .collect();
        let Some((&chosen, others)) = candidates.split_first() else {
            // The cell may still hide in the subject's symbolic frame.
            return if subject.rest.is_some() {
                Flow::Undecided
            } else {
                Flow::Fail
            };
        };

        for &i in others.iter().rev() {
            let mut alt = state.clone();
            take_cell(&mut alt, first, more, rest, &subject, &taken, i);
            work.push(alt);
        }
        take_cell(state, first, more, rest, &subject, &taken, chosen);
        Flow::Continue
    }

    fn bind(&self, state: &mut State<'_>, var: Variable, subject: Term) -> Flow {
        match self.admits(&var, &subject) {
            Admit::Yes => {}
            Admit::No => return Flow::Fail,
            Admit::Maybe => return Flow::Undecided,
        }
        match state.subst.bind(var, subject) {
            Ok(()) => Flow::Continue,
            Err(conflict) if conflict.existing.is_ground() && conflict.incoming.is_ground() => Flow::Conflict,
            Err(conflict) => {
                state.constraints.assume(Term::app(
                    self.known.eq_k,
                    vec![conflict.existing, conflict.incoming],
                ));
                Flow::Continue
            }
        }
    }

    /// Record `subject == pattern` once every variable of `pattern` is bound.
    fn constrain(&self, state: &mut State<'_>, pattern: &Term, subject: &Term) -> bool {
        if !pattern.vars().iter().all(|v| state.subst.is_bound(v)) {
            return false;
        }
        let instance = apply_subst(pattern, &state.subst);
        state
            .constraints
            .assume(Term::app(self.known.eq_k, vec![subject.clone(), instance]));
        true
    }

    fn admits(&self, var: &Variable, subject: &Term) -> Admit {
        if var.sort == self.known.k {
            return Admit::Yes;
        }
        match self.def.sort_of(subject) {
            None => Admit::Yes,
            Some(s) if self.def.is_subsort(s, var.sort) => Admit::Yes,
            // A symbolic subject of a wider sort may or may not fit.
            Some(s) if subject.as_var().is_some() && self.def.is_subsort(var.sort, s) => Admit::Maybe,
            Some(_) => Admit::No,
        }
    }

    fn sorts_overlap(&self, pattern: &Term, subject: &Variable) -> bool {
        match self.def.sort_of(pattern) {
            None => true,
            Some(s) => self.def.is_subsort(s, subject.sort) || self.def.is_subsort(subject.sort, s),
        }
    }
}

fn take_cell<'p>(
    state: &mut State<'p>,
    pattern: &'p Arc<Cell>,
    more: &'p [Arc<Cell>],
    rest: Option<Variable>,
    subject: &Arc<CellCollection>,
    taken: &SmallVec<[bool; 8]>,
    index: usize,
) {
    let mut taken = taken.clone();
    taken[index] = true;
    let target = &subject.cells[index];
    state.subst.record_cell(pattern.id, target.id);
    state.goals.push(Goal::Cells {
        pats: more,
        rest,
        subject: Arc::clone(subject),
        taken,
    });
    state.goals.push(Goal::Term(&pattern.content, target.content.clone()));
}

#[cfg(test)]
#[path = "tests/matching.rs"]
mod tests;
