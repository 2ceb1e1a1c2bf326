//! Compiled semantics consumed by the rewrite machine.
//!
//! A `Definition` bundles symbol signatures, the ordered rule set, function
//! rules, built-in hooks and the fresh-name table. It is assembled once through
//! `DefinitionBuilder` and is immutable afterwards, so one `Arc<Definition>` is
//! shared by every machine and worker of a run.

use crate::builtins::{BuiltinFn, STANDARD_HOOKS};
use crate::error::{Result, RewriteError};
use crate::fresh::FreshNameTable;
use crate::symbol::{Label, Sort, SymbolStore};
use crate::term::{Cell, CellIds, Term, VarKind, Variable};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Rule identifier; assigned in declaration order.
pub type RuleId = u32;

/// Priority given to rules that do not set one. Lower runs first.
pub const DEFAULT_PRIORITY: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Constructor,
    /// Evaluated eagerly wherever it is built, by hook or by function rules.
    Function,
}

#[derive(Debug, Clone)]
pub struct SymbolDecl {
    pub label: Label,
    pub arity: usize,
    pub sort: Sort,
    pub kind: SymbolKind,
    pub hook: Option<BuiltinFn>,
}

/// A rewrite rule `lhs => rhs requires cond`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub name: Option<String>,
    pub lhs: Term,
    pub rhs: Term,
    pub requires: Option<Term>,
    pub priority: u32,
    vars: Vec<Variable>,
}

impl Rule {
    /// The id is assigned by `DefinitionBuilder::rule`.
    pub fn new(lhs: Term, rhs: Term) -> Self {
        Self {
            id: 0,
            name: None,
            lhs,
            rhs,
            requires: None,
            priority: DEFAULT_PRIORITY,
            vars: Vec::new(),
        }
    }

    pub fn requires(mut self, cond: Term) -> Self {
        self.requires = Some(cond);
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declared variable set: left-hand-side variables plus fresh variables of
    /// the right-hand side.
    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn fresh_vars(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter().filter(|v| v.kind == VarKind::Fresh)
    }

    fn collect_vars(&mut self) {
        let mut vars = self.lhs.vars();
        for v in self.rhs.vars() {
            if v.kind == VarKind::Fresh && !vars.contains(&v) {
                vars.push(v);
            }
        }
        self.vars = vars;
    }

    /// Total order used for concrete execution: priority, then declaration.
    fn order_key(&self) -> (u32, RuleId) {
        (self.priority, self.id)
    }
}

/// Candidate rules per subject top label, each list in rule order.
#[derive(Debug, Clone, Default)]
struct RuleIndex {
    by_label: HashMap<Label, Vec<usize>>,
    generic: Vec<usize>,
    all: Vec<usize>,
}

impl RuleIndex {
    fn build(rules: &[Rule]) -> Self {
        let mut specific: HashMap<Label, Vec<usize>> = HashMap::new();
        let mut generic = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            match rule.lhs.top_label() {
                Some(label) => specific.entry(label).or_default().push(i),
                None => generic.push(i),
            }
        }
        // Rules are already sorted, so merging two sorted index lists keeps
        // the rule order.
        let by_label = specific
            .into_iter()
            .map(|(label, mut idx)| {
                idx.extend(generic.iter().copied());
                idx.sort_unstable();
                (label, idx)
            })
            .collect();
        Self {
            by_label,
            generic,
            all: (0..rules.len()).collect(),
        }
    }

    fn candidates(&self, subject: &Term) -> &[usize] {
        match subject {
            // An unknown value may be an instance of any left side.
            Term::Var(_) => &self.all,
            _ => subject
                .top_label()
                .and_then(|l| self.by_label.get(&l))
                .map(Vec::as_slice)
                .unwrap_or(&self.generic),
        }
    }
}

pub struct Definition {
    symbols: Arc<SymbolStore>,
    decls: HashMap<Label, SymbolDecl>,
    rules: Vec<Rule>,
    index: RuleIndex,
    function_rules: HashMap<Label, Vec<Rule>>,
    fresh: FreshNameTable,
    supersorts: HashMap<Sort, Vec<Sort>>,
    cell_ids: CellIds,
}

impl Definition {
    pub fn symbols(&self) -> &SymbolStore {
        &self.symbols
    }

    pub fn shared_symbols(&self) -> Arc<SymbolStore> {
        Arc::clone(&self.symbols)
    }

    pub fn decl(&self, label: Label) -> Option<&SymbolDecl> {
        self.decls.get(&label)
    }

    pub fn is_function(&self, label: Label) -> bool {
        self.decls
            .get(&label)
            .map_or(false, |d| d.kind == SymbolKind::Function)
    }

    /// Rewrite rules in execution order (priority, then declaration).
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules
            .iter()
            .chain(self.function_rules.values().flatten())
            .find(|r| r.id == id)
    }

    /// Rules whose left side could match `subject`, in execution order.
    pub fn candidates<'a>(&'a self, subject: &Term) -> impl Iterator<Item = &'a Rule> + 'a {
        let idx: &'a [usize] = self.index.candidates(subject);
        idx.iter().map(move |&i| &self.rules[i])
    }

    pub fn function_rules(&self, label: Label) -> &[Rule] {
        self.function_rules
            .get(&label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn fresh_table(&self) -> &FreshNameTable {
        &self.fresh
    }

    /// Allocator for every cell built against this definition: rule patterns,
    /// subjects and cells created by rewrites.
    pub fn cell_ids(&self) -> &CellIds {
        &self.cell_ids
    }

    pub fn cell(&self, name: Label, content: Term) -> Arc<Cell> {
        Cell::new(&self.cell_ids, name, content)
    }

    /// Reflexive, transitive subsort check. Every sort is below `K`.
    pub fn is_subsort(&self, sub: Sort, sup: Sort) -> bool {
        sub == sup
            || sup == self.symbols.known().k
            || self
                .supersorts
                .get(&sub)
                .map_or(false, |sups| sups.contains(&sup))
    }

    /// Sort of a term when it can be read off: tokens, variables and
    /// applications of declared labels.
    pub fn sort_of(&self, term: &Term) -> Option<Sort> {
        match term {
            Term::Token(t) => Some(t.sort),
            Term::Var(v) => Some(v.sort),
            Term::App(app) => self.decls.get(&app.label).map(|d| d.sort),
            Term::List(_) | Term::Cells(_) => None,
        }
    }

    /// Checked application: validates arity against the declared signature.
    /// Undeclared labels are accepted as free constructors.
    pub fn app(&self, label: Label, args: impl Into<SmallVec<[Term; 4]>>) -> Result<Term> {
        let args = args.into();
        self.check_arity(label, args.len())?;
        Ok(Term::app(label, args))
    }

    fn check_arity(&self, label: Label, found: usize) -> Result<()> {
        match self.decls.get(&label) {
            Some(decl) if decl.arity != found => Err(RewriteError::MalformedTerm {
                label: self.symbols.name(label).to_string(),
                expected: decl.arity,
                found,
            }),
            _ => Ok(()),
        }
    }

    fn check_term(&self, term: &Term) -> Result<()> {
        let mut result = Ok(());
        term.visit(&mut |t| {
            if result.is_ok() {
                if let Term::App(app) = t {
                    result = self.check_arity(app.label, app.args.len());
                }
            }
        });
        result
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("symbols", &self.decls.len())
            .field("rules", &self.rules.len())
            .field("function_rules", &self.function_rules.len())
            .field("fresh_sorts", &self.fresh.len())
            .finish()
    }
}

/// Assembles a `Definition`; the stand-in for the external compilation pipeline.
pub struct DefinitionBuilder {
    symbols: Arc<SymbolStore>,
    decls: HashMap<Label, SymbolDecl>,
    rules: Vec<Rule>,
    fresh: Vec<(Sort, Label)>,
    subsorts: Vec<(Sort, Sort)>,
    cell_ids: CellIds,
}

impl DefinitionBuilder {
    pub fn new(symbols: Arc<SymbolStore>) -> Self {
        Self {
            symbols,
            decls: HashMap::new(),
            rules: Vec::new(),
            fresh: Vec::new(),
            subsorts: Vec::new(),
            cell_ids: CellIds::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolStore {
        &self.symbols
    }

    /// Build a rule-pattern cell. Reuse the returned cell's id (via
    /// `Cell::with_content`) on the right-hand side to rewrite that cell in
    /// place.
    pub fn cell(&self, name: &str, content: Term) -> Arc<Cell> {
        Cell::new(&self.cell_ids, self.symbols.intern(name), content)
    }

    /// Declare `sub < sup` in the sort lattice.
    pub fn subsort(&mut self, sub: &str, sup: &str) {
        let sub = self.symbols.intern(sub);
        let sup = self.symbols.intern(sup);
        self.subsorts.push((sub, sup));
    }

    fn declare(&mut self, name: &str, arity: usize, sort: &str, kind: SymbolKind, hook: Option<BuiltinFn>) -> Label {
        let label = self.symbols.intern(name);
        let sort = self.symbols.intern(sort);
        self.decls.insert(
            label,
            SymbolDecl {
                label,
                arity,
                sort,
                kind,
                hook,
            },
        );
        label
    }

    pub fn constructor(&mut self, name: &str, arity: usize, sort: &str) -> Label {
        self.declare(name, arity, sort, SymbolKind::Constructor, None)
    }

    /// A function defined by function rules.
    pub fn function(&mut self, name: &str, arity: usize, sort: &str) -> Label {
        self.declare(name, arity, sort, SymbolKind::Function, None)
    }

    /// A function implemented by a Rust hook.
    pub fn hooked_function(&mut self, name: &str, arity: usize, sort: &str, hook: BuiltinFn) -> Label {
        self.declare(name, arity, sort, SymbolKind::Function, Some(hook))
    }

    /// Install the standard integer, boolean, string and equality hooks.
    pub fn with_builtins(mut self) -> Self {
        for &(name, arity, sort, hook) in STANDARD_HOOKS {
            self.hooked_function(name, arity, sort, hook);
        }
        self
    }

    /// Register `generator` as the fresh-value function for `sort`.
    pub fn fresh_generator(&mut self, sort: &str, generator: Label) {
        let sort = self.symbols.intern(sort);
        self.fresh.push((sort, generator));
    }

    /// Add a rule; ids follow declaration order.
    pub fn rule(&mut self, mut rule: Rule) -> RuleId {
        let id = self.rules.len() as RuleId;
        rule.id = id;
        rule.collect_vars();
        self.rules.push(rule);
        id
    }

    /// Validate and freeze.
    ///
    /// Every application in every rule must agree with its declared arity, and
    /// every fresh generator must be a declared function.
    pub fn build(self) -> Result<Definition> {
        let mut def = Definition {
            symbols: self.symbols,
            decls: self.decls,
            rules: Vec::new(),
            index: RuleIndex::default(),
            function_rules: HashMap::new(),
            fresh: FreshNameTable::new(),
            supersorts: transitive_closure(&self.subsorts),
            cell_ids: self.cell_ids,
        };

        for (sort, generator) in self.fresh {
            if !def.is_function(generator) {
                return Err(RewriteError::UnknownSymbol {
                    name: def.symbols.name(generator).to_string(),
                });
            }
            def.fresh.register(sort, generator);
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            def.check_term(&rule.lhs)?;
            def.check_term(&rule.rhs)?;
            if let Some(cond) = &rule.requires {
                def.check_term(cond)?;
            }
            match rule.lhs.top_label() {
                Some(label) if def.is_function(label) => {
                    def.function_rules.entry(label).or_default().push(rule)
                }
                _ => rules.push(rule),
            }
        }
        rules.sort_by_key(Rule::order_key);
        for fns in def.function_rules.values_mut() {
            fns.sort_by_key(Rule::order_key);
        }
        def.index = RuleIndex::build(&rules);
        def.rules = rules;
        Ok(def)
    }
}

fn transitive_closure(pairs: &[(Sort, Sort)]) -> HashMap<Sort, Vec<Sort>> {
    let mut sups: HashMap<Sort, Vec<Sort>> = HashMap::new();
    for &(sub, sup) in pairs {
        sups.entry(sub).or_default().push(sup);
    }
    let keys: Vec<Sort> = sups.keys().copied().collect();
    for sort in keys {
        let mut seen: Vec<Sort> = Vec::new();
        let mut stack: Vec<Sort> = sups.get(&sort).cloned().unwrap_or_default();
        while let Some(next) = stack.pop() {
            if next == sort || seen.contains(&next) {
                continue;
            }
            seen.push(next);
            if let Some(more) = sups.get(&next) {
                stack.extend(more.iter().copied());
            }
        }
        sups.insert(sort, seen);
    }
    sups
}

#[cfg(test)]
#[path = "tests/definition.rs"]
mod tests;
