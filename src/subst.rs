use crate::term::{CellId, Term, Variable};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// A variable was bound twice to terms that are not equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConflict {
    pub var: Variable,
    pub existing: Term,
    pub incoming: Term,
}

impl fmt::Display for BindingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflicting binding for variable {:?}", self.var.name)
    }
}

impl std::error::Error for BindingConflict {}

/// One write-set entry: the rule's pattern cell and the subject cell it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellWrite {
    pub pattern: CellId,
    pub target: CellId,
}

/// Bindings found while matching a rule, plus the subject cells the rule will
/// overwrite.
///
/// Created empty per match attempt, filled in as matching descends, consumed by
/// one apply step. It never touches the subject itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedSubstitution {
    bindings: SmallVec<[(Variable, Term); 8]>,
    write_set: SmallVec<[CellWrite; 4]>,
}

impl ExtendedSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &Variable) -> Option<&Term> {
        self.bindings
            .iter()
            .find(|(v, _)| v == var)
            .map(|(_, t)| t)
    }

    pub fn is_bound(&self, var: &Variable) -> bool {
        self.get(var).is_some()
    }

    /// Bind `var` to `term`. Re-binding to an equal term is a no-op.
    pub fn bind(&mut self, var: Variable, term: Term) -> Result<(), BindingConflict> {
        match self.get(&var) {
            Some(existing) if *existing == term => Ok(()),
            Some(existing) => Err(BindingConflict {
                var,
                existing: existing.clone(),
                incoming: term,
            }),
            None => {
                self.bindings.push((var, term));
                Ok(())
            }
        }
    }

    /// Bind `var` unless it already has a binding, which is kept.
    pub fn bind_if_unbound(&mut self, var: Variable, term: Term) {
        if !self.is_bound(&var) {
            self.bindings.push((var, term));
        }
    }

    /// Merge bindings and write set of `other` into `self`.
    pub fn merge(&mut self, other: &ExtendedSubstitution) -> Result<(), BindingConflict> {
        for (var, term) in &other.bindings {
            self.bind(*var, term.clone())?;
        }
        for write in &other.write_set {
            self.record_cell(write.pattern, write.target);
        }
        Ok(())
    }

    /// Record that the rule's `pattern` cell matched subject cell `target`.
    /// Recording the same pair twice is a no-op.
    pub fn record_cell(&mut self, pattern: CellId, target: CellId) {
        let write = CellWrite { pattern, target };
        if !self.write_set.contains(&write) {
            self.write_set.push(write);
        }
    }

    pub fn write_set(&self) -> &[CellWrite] {
        &self.write_set
    }

    /// Subject cells in the write set, in recording order.
    pub fn targets(&self) -> impl Iterator<Item = CellId> + '_ {
        self.write_set.iter().map(|w| w.target)
    }

    pub fn target_of(&self, pattern: CellId) -> Option<CellId> {
        self.write_set
            .iter()
            .find(|w| w.pattern == pattern)
            .map(|w| w.target)
    }

    pub fn is_target(&self, cell: CellId) -> bool {
        self.write_set.iter().any(|w| w.target == cell)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.bindings.iter().map(|(v, t)| (v, t))
    }

    /// True when every bound variable is one of `declared`.
    pub fn domain_within(&self, declared: &[Variable]) -> bool {
        self.bindings.iter().all(|(v, _)| declared.contains(v))
    }

    /// Every write-set target is a cell of `subject`.
    pub fn write_set_within(&self, subject: &Term) -> bool {
        let cells = subject.cell_ids();
        self.targets().all(|id| cells.contains(&id))
    }
}

/// Apply a substitution to a term.
///
/// Bound variables are replaced; unbound variables stay. Sub-terms that contain
/// no bound variable are returned as the same `Arc`, not copies. Rest variables
/// bound to sequences or collections splice into the enclosing sequence or
/// collection, so the associativity invariant holds for the result.
pub fn apply_subst(term: &Term, subst: &ExtendedSubstitution) -> Term {
    if subst.is_empty() {
        return term.clone();
    }
    rebuild(term, subst).unwrap_or_else(|| term.clone())
}

/// Returns `None` when `term` is unchanged by `subst`.
fn rebuild(term: &Term, subst: &ExtendedSubstitution) -> Option<Term> {
    match term {
        Term::Token(_) => None,
        Term::Var(v) => subst.get(v).cloned(),
        Term::App(app) => {
            let args: SmallVec<[Term; 4]> = rebuild_all(&app.args, subst)?;
            Some(Term::app(app.label, args))
        }
        Term::List(list) => {
            let items: Vec<Term> = rebuild_all(&list.items, subst)?;
            Some(Term::list(list.op, items))
        }
        Term::Cells(coll) => {
            let mut changed = false;
            let mut cells = Vec::with_capacity(coll.cells.len());
            for cell in &coll.cells {
                match rebuild(&cell.content, subst) {
                    Some(content) => {
                        changed = true;
                        cells.push(cell.with_content(content));
                    }
                    None => cells.push(Arc::clone(cell)),
                }
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
                Some(Term::cells(cells, rest))
            } else {
                None
            }
        }
    }
}

fn rebuild_all<C>(items: &[Term], subst: &ExtendedSubstitution) -> Option<C>
where
    C: FromIterator<Term>,
{
    let rebuilt: SmallVec<[Option<Term>; 8]> = items.iter().map(|t| rebuild(t, subst)).collect();
    if rebuilt.iter().all(Option::is_none) {
        return None;
    }
    Some(
        rebuilt
            .into_iter()
            .zip(items)
            .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
            .collect(),
    )
}

#[cfg(test)]
#[path = "tests/subst.rs"]
mod tests;
