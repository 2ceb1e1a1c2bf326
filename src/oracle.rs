//! Decision oracle interface and the symbolic state it reasons about.
//!
//! The core never decides symbolic questions itself. Matching asks the oracle to
//! refine a substitution under a path condition, side conditions and proof
//! closure ask it to decide propositions. `Unknown` is always a legal answer and
//! is never read as `True`.

use crate::subst::{apply_subst, ExtendedSubstitution};
use crate::symbol::{KnownSymbols, SymbolStore};
use crate::term::Term;
use serde::Serialize;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Decision {
    True,
    False,
    Unknown,
}

impl Decision {
    pub fn negate(self) -> Decision {
        match self {
            Decision::True => Decision::False,
            Decision::False => Decision::True,
            Decision::Unknown => Decision::Unknown,
        }
    }
}

/// Conjunction of boolean terms assumed along one execution path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathCondition {
    conjuncts: SmallVec<[Term; 4]>,
}

impl PathCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conjuncts(conjuncts: impl IntoIterator<Item = Term>) -> Self {
        let mut pc = Self::new();
        for c in conjuncts {
            pc.assume(c);
        }
        pc
    }

    /// Add a conjunct; duplicates are dropped.
    pub fn assume(&mut self, prop: Term) {
        if !self.conjuncts.contains(&prop) {
            self.conjuncts.push(prop);
        }
    }

    pub fn and(&self, other: &PathCondition) -> PathCondition {
        let mut out = self.clone();
        for c in &other.conjuncts {
            out.assume(c.clone());
        }
        out
    }

    pub fn contains(&self, prop: &Term) -> bool {
        self.conjuncts.contains(prop)
    }

    pub fn conjuncts(&self) -> &[Term] {
        &self.conjuncts
    }

    pub fn is_trivial(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn apply_subst(&self, subst: &ExtendedSubstitution) -> PathCondition {
        PathCondition::from_conjuncts(self.conjuncts.iter().map(|c| apply_subst(c, subst)))
    }
}

/// A symbolic configuration: a term together with the path condition under
/// which it is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstrainedTerm {
    pub term: Term,
    pub condition: PathCondition,
}

impl ConstrainedTerm {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            condition: PathCondition::new(),
        }
    }

    pub fn with_condition(term: Term, condition: PathCondition) -> Self {
        Self { term, condition }
    }
}

impl From<Term> for ConstrainedTerm {
    fn from(term: Term) -> Self {
        ConstrainedTerm::new(term)
    }
}

/// Answer of `DecisionOracle::refine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    /// Satisfiable; the substitution may have been specialised.
    Refined(ExtendedSubstitution),
    /// The path condition cannot hold: definite non-match.
    Unsat,
    /// The oracle could not tell (no solver, timeout, unsupported theory).
    Unknown,
}

/// External decision procedure consulted for symbolic questions.
pub trait DecisionOracle: Send + Sync {
    /// Does `proposition` hold under `path`?
    fn decide(&self, path: &PathCondition, proposition: &Term) -> Decision;

    /// Check `path` for satisfiability, optionally specialising `subst`.
    fn refine(&self, subst: &ExtendedSubstitution, path: &PathCondition) -> Refinement;

    /// Does `premise` entail every conjunct of `conclusion`?
    fn implies(&self, premise: &PathCondition, conclusion: &PathCondition) -> Decision {
        let mut result = Decision::True;
        for c in conclusion.conjuncts() {
            match self.decide(premise, c) {
                Decision::True => {}
                Decision::False => return Decision::False,
                Decision::Unknown => result = Decision::Unknown,
            }
        }
        result
    }
}

/// No oracle: every symbolic question is unanswered.
impl DecisionOracle for () {
    fn decide(&self, _path: &PathCondition, proposition: &Term) -> Decision {
        match proposition.as_bool() {
            Some(true) => Decision::True,
            Some(false) => Decision::False,
            None => Decision::Unknown,
        }
    }

    fn refine(&self, subst: &ExtendedSubstitution, path: &PathCondition) -> Refinement {
        if path.is_trivial() {
            Refinement::Refined(subst.clone())
        } else if path.conjuncts().iter().any(|c| c.as_bool() == Some(false)) {
            Refinement::Unsat
        } else {
            Refinement::Unknown
        }
    }
}

/// Oracle that answers what can be read off the syntax: ground booleans,
/// ground equalities, and propositions (or their negations) already assumed in
/// the path condition. Anything else is `Unknown`, and an otherwise
/// unrefuted path condition is treated as satisfiable.
#[derive(Debug, Clone, Copy)]
pub struct SyntacticOracle {
    known: KnownSymbols,
}

impl SyntacticOracle {
    pub fn new(symbols: &SymbolStore) -> Self {
        Self {
            known: *symbols.known(),
        }
    }

    fn negation_of<'t>(&self, prop: &'t Term) -> Option<&'t Term> {
        let app = prop.as_app()?;
        if app.label == self.known.not_bool && app.args.len() == 1 {
            Some(&app.args[0])
        } else {
            None
        }
    }

    fn decide_in(&self, path: &PathCondition, prop: &Term, depth: usize) -> Decision {
        if depth > 32 {
            return Decision::Unknown;
        }
        if let Some(b) = prop.as_bool() {
            return if b { Decision::True } else { Decision::False };
        }
        if path.contains(prop) {
            return Decision::True;
        }
        if let Some(inner) = self.negation_of(prop) {
            return self.decide_in(path, inner, depth + 1).negate();
        }
        if path
            .conjuncts()
            .iter()
            .any(|c| self.negation_of(c) == Some(prop))
        {
            return Decision::False;
        }
        if let Some(app) = prop.as_app() {
            if app.label == self.known.eq_k && app.args.len() == 2 {
                let (a, b) = (&app.args[0], &app.args[1]);
                if a == b {
                    return Decision::True;
                }
                if a.is_ground() && b.is_ground() {
                    return Decision::False;
                }
            }
            if app.label == self.known.and_bool && app.args.len() == 2 {
                let l = self.decide_in(path, &app.args[0], depth + 1);
                let r = self.decide_in(path, &app.args[1], depth + 1);
                return match (l, r) {
                    (Decision::False, _) | (_, Decision::False) => Decision::False,
                    (Decision::True, Decision::True) => Decision::True,
                    _ => Decision::Unknown,
                };
            }
        }
        Decision::Unknown
    }
}

impl DecisionOracle for SyntacticOracle {
    fn decide(&self, path: &PathCondition, proposition: &Term) -> Decision {
        self.decide_in(path, proposition, 0)
    }

    fn refine(&self, subst: &ExtendedSubstitution, path: &PathCondition) -> Refinement {
        let empty = PathCondition::new();
        for c in path.conjuncts() {
            if self.decide_in(&empty, c, 0) == Decision::False {
                return Refinement::Unsat;
            }
            if let Some(inner) = self.negation_of(c) {
                if path.contains(inner) {
                    return Refinement::Unsat;
                }
            }
        }
        Refinement::Refined(subst.clone())
    }
}

#[cfg(test)]
#[path = "tests/oracle.rs"]
mod tests;
