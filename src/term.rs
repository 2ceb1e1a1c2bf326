//! Term Model - immutable, structurally shared configuration terms.
//!
//! A term is a closed tagged variant: tokens, variables, labeled applications,
//! flattening associative sequences and cell collections. Compound variants sit
//! behind `Arc`, so cloning a term is cheap and rebuilding a term after a rewrite
//! only allocates along the changed spine.
//!
//! Cells carry a `CellId` that is independent of their contents. The id survives
//! content updates, which is what lets a rewrite name "this cell" in its write
//! set and have the apply step replace exactly that entry.

use crate::symbol::{Label, Sort, SymbolStore, VarName};
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Stable identity of a cell, independent of the cell's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Allocator for cell identities.
///
/// Owned by a `Definition`; rule patterns, subjects and cells created by
/// rewrites all draw their ids here, so ids never collide within one term.
#[derive(Debug, Default)]
pub struct CellIds {
    next: AtomicU32,
}

impl CellIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> CellId {
        CellId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// How a variable participates in matching and instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKind {
    /// Matches exactly one term.
    Plain,
    /// Matches a contiguous run of a sequence, or the unmatched remainder of a
    /// cell collection.
    Rest,
    /// Right-hand-side only; bound to a fresh value of its sort on each apply.
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: VarName,
    pub sort: Sort,
    pub kind: VarKind,
}

impl Variable {
    pub fn new(name: VarName, sort: Sort) -> Self {
        Self {
            name,
            sort,
            kind: VarKind::Plain,
        }
    }

    pub fn rest(name: VarName, sort: Sort) -> Self {
        Self {
            name,
            sort,
            kind: VarKind::Rest,
        }
    }

    pub fn fresh(name: VarName, sort: Sort) -> Self {
        Self {
            name,
            sort,
            kind: VarKind::Fresh,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.kind == VarKind::Rest
    }
}

/// A sort-tagged literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub sort: Sort,
    pub value: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Application {
    pub label: Label,
    pub args: SmallVec<[Term; 4]>,
}

/// Flattened associative sequence under operator `op`.
///
/// Invariant: no item is itself a `ListSeq` with the same operator. Every
/// constructor in this module maintains it, so derived equality and hashing
/// already treat `(a·b)·c` and `a·(b·c)` as the same term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListSeq {
    pub op: Label,
    pub items: Vec<Term>,
}

/// A named slot of a configuration.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    pub name: Label,
    pub content: Term,
}

impl Cell {
    pub fn new(ids: &CellIds, name: Label, content: Term) -> Arc<Cell> {
        Arc::new(Cell {
            id: ids.next(),
            name,
            content,
        })
    }

    /// Same cell, new contents.
    pub fn with_content(&self, content: Term) -> Arc<Cell> {
        Arc::new(Cell {
            id: self.id,
            name: self.name,
            content,
        })
    }
}

// Equality ignores `id`: two configurations with the same cells and contents
// are the same configuration.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.content == other.content
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.content.hash(state);
    }
}

/// Multiset of cells keyed by name, optionally closed by a rest variable.
#[derive(Debug, Clone)]
pub struct CellCollection {
    pub cells: Vec<Arc<Cell>>,
    pub rest: Option<Variable>,
}

impl CellCollection {
    pub fn cells_named(&self, name: Label) -> impl Iterator<Item = &Arc<Cell>> + '_ {
        self.cells.iter().filter(move |c| c.name == name)
    }

    pub fn position(&self, id: CellId) -> Option<usize> {
        self.cells.iter().position(|c| c.id == id)
    }
}

impl PartialEq for CellCollection {
    fn eq(&self, other: &Self) -> bool {
        if self.rest != other.rest || self.cells.len() != other.cells.len() {
            return false;
        }
        let mut used: SmallVec<[bool; 16]> = SmallVec::from_elem(false, other.cells.len());
        'outer: for cell in &self.cells {
            for (i, candidate) in other.cells.iter().enumerate() {
                if !used[i] && cell == candidate {
                    used[i] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }
}

impl Eq for CellCollection {}

impl Hash for CellCollection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: combine per-cell hashes commutatively.
        let mut acc: u64 = 0;
        for cell in &self.cells {
            let mut h = FxHasher::default();
            cell.hash(&mut h);
            acc = acc.wrapping_add(h.finish());
        }
        self.cells.len().hash(state);
        acc.hash(state);
        self.rest.hash(state);
    }
}

/// A term is one of five variants; compound variants are shared via `Arc`.
#[derive(Debug, Clone)]
pub enum Term {
    Token(Arc<Token>),
    Var(Variable),
    App(Arc<Application>),
    List(Arc<ListSeq>),
    Cells(Arc<CellCollection>),
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Token(a), Term::Token(b)) => Arc::ptr_eq(a, b) || a == b,
            (Term::Var(a), Term::Var(b)) => a == b,
            (Term::App(a), Term::App(b)) => Arc::ptr_eq(a, b) || a == b,
            (Term::List(a), Term::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Term::Cells(a), Term::Cells(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Term::Token(t) => t.hash(state),
            Term::Var(v) => v.hash(state),
            Term::App(a) => a.hash(state),
            Term::List(l) => l.hash(state),
            Term::Cells(c) => c.hash(state),
        }
    }
}

impl Term {
    pub fn token(sort: Sort, value: impl Into<Arc<str>>) -> Term {
        Term::Token(Arc::new(Token {
            sort,
            value: value.into(),
        }))
    }

    pub fn int(symbols: &SymbolStore, n: i64) -> Term {
        Term::token(symbols.known().int, n.to_string())
    }

    pub fn bool(symbols: &SymbolStore, b: bool) -> Term {
        Term::token(symbols.known().bool_, if b { "true" } else { "false" })
    }

    pub fn string(symbols: &SymbolStore, s: &str) -> Term {
        Term::token(symbols.known().string, s)
    }

    pub fn var(v: Variable) -> Term {
        Term::Var(v)
    }

    /// Unchecked application; `Definition::app` validates arity.
    pub fn app(label: Label, args: impl Into<SmallVec<[Term; 4]>>) -> Term {
        Term::App(Arc::new(Application {
            label,
            args: args.into(),
        }))
    }

    pub fn app0(label: Label) -> Term {
        Term::app(label, SmallVec::new())
    }

    /// Build a sequence, splicing in any item that is already a sequence over
    /// the same operator.
    pub fn list(op: Label, items: impl IntoIterator<Item = Term>) -> Term {
        let mut flat = Vec::new();
        for item in items {
            push_flat(op, item, &mut flat);
        }
        Term::List(Arc::new(ListSeq { op, items: flat }))
    }

    /// Associative concatenation `a·b`.
    pub fn concat(op: Label, a: Term, b: Term) -> Term {
        Term::list(op, [a, b])
    }

    pub fn cells(cells: impl IntoIterator<Item = Arc<Cell>>, rest: Option<Variable>) -> Term {
        Term::Cells(Arc::new(CellCollection {
            cells: cells.into_iter().collect(),
            rest,
        }))
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Term::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_app(&self) -> Option<&Application> {
        match self {
            Term::App(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListSeq> {
        match self {
            Term::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_cells(&self) -> Option<&CellCollection> {
        match self {
            Term::Cells(c) => Some(c),
            _ => None,
        }
    }

    /// Value of an `Int` token. Tokens of other sorts are not integers, even
    /// when their text parses as one.
    pub fn as_int(&self, symbols: &SymbolStore) -> Option<i64> {
        let token = self.as_token()?;
        if token.sort != symbols.known().int {
            return None;
        }
        token.value.parse().ok()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_token()?.value.as_ref() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    /// Top label used for rule indexing.
    pub fn top_label(&self) -> Option<Label> {
        self.as_app().map(|a| a.label)
    }

    /// Pre-order traversal over this term and every sub-term, including cell
    /// contents.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Term)) {
        let mut stack: SmallVec<[&'a Term; 16]> = SmallVec::new();
        stack.push(self);
        while let Some(t) = stack.pop() {
            f(t);
            match t {
                Term::Token(_) | Term::Var(_) => {}
                Term::App(app) => stack.extend(app.args.iter().rev()),
                Term::List(list) => stack.extend(list.items.iter().rev()),
                Term::Cells(cells) => stack.extend(cells.cells.iter().rev().map(|c| &c.content)),
            }
        }
    }

    /// Distinct variables in first-occurrence order, including cell-collection
    /// rest variables.
    pub fn vars(&self) -> Vec<Variable> {
        let mut out: Vec<Variable> = Vec::new();
        self.visit(&mut |t| {
            let v = match t {
                Term::Var(v) => Some(*v),
                Term::Cells(c) => c.rest,
                _ => None,
            };
            if let Some(v) = v {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        });
        out
    }

    /// A term with no variables is concrete.
    pub fn is_ground(&self) -> bool {
        let mut ground = true;
        self.visit(&mut |t| match t {
            Term::Var(_) => ground = false,
            Term::Cells(c) if c.rest.is_some() => ground = false,
            _ => {}
        });
        ground
    }

    pub fn size(&self) -> usize {
        let mut n = 0;
        self.visit(&mut |_| n += 1);
        n
    }

    pub fn find_cell(&self, id: CellId) -> Option<&Arc<Cell>> {
        let mut found = None;
        self.visit(&mut |t| {
            if found.is_none() {
                if let Term::Cells(c) = t {
                    found = c.cells.iter().find(|cell| cell.id == id);
                }
            }
        });
        found
    }

    pub fn contains_cell(&self, id: CellId) -> bool {
        self.find_cell(id).is_some()
    }

    /// Every cell reachable from this term, in traversal order.
    pub fn cell_ids(&self) -> Vec<CellId> {
        let mut out = Vec::new();
        self.visit(&mut |t| {
            if let Term::Cells(c) = t {
                out.extend(c.cells.iter().map(|cell| cell.id));
            }
        });
        out
    }

    /// Content-addressed fingerprint, stable within a process.
    pub fn fingerprint(&self) -> u64 {
        let mut h = FxHasher::default();
        self.hash(&mut h);
        h.finish()
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolStore) -> TermDisplay<'a> {
        TermDisplay {
            term: self,
            symbols,
        }
    }
}

fn push_flat(op: Label, item: Term, out: &mut Vec<Term>) {
    match item {
        Term::List(inner) if inner.op == op => out.extend(inner.items.iter().cloned()),
        other => out.push(other),
    }
}

/// Display adapter; terms alone cannot resolve interned names.
pub struct TermDisplay<'a> {
    term: &'a Term,
    symbols: &'a SymbolStore,
}

impl std::fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_term(self.term, self.symbols))
    }
}

pub fn format_term(term: &Term, symbols: &SymbolStore) -> String {
    fn var(v: &Variable, symbols: &SymbolStore, out: &mut String) {
        if v.kind == VarKind::Fresh {
            out.push('!');
        }
        out.push_str(symbols.name(v.name));
        out.push(':');
        out.push_str(symbols.name(v.sort));
        if v.is_rest() {
            out.push_str("...");
        }
    }

    fn render(term: &Term, symbols: &SymbolStore, out: &mut String) {
        match term {
            Term::Token(t) => {
                if t.sort == symbols.known().string {
                    out.push('"');
                    out.push_str(&t.value);
                    out.push('"');
                } else {
                    out.push_str(&t.value);
                }
            }
            Term::Var(v) => var(v, symbols, out),
            Term::App(app) => {
                out.push_str(symbols.name(app.label));
                if !app.args.is_empty() {
                    out.push('(');
                    for (i, arg) in app.args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        render(arg, symbols, out);
                    }
                    out.push(')');
                }
            }
            Term::List(list) => {
                if list.items.is_empty() {
                    out.push('.');
                    out.push_str(symbols.name(list.op));
                }
                let sep = symbols.name(list.op).trim_matches('_');
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                        out.push_str(sep);
                        out.push(' ');
                    }
                    render(item, symbols, out);
                }
            }
            Term::Cells(cells) => {
                for (i, cell) in cells.cells.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    let name = symbols.name(cell.name);
                    out.push('<');
                    out.push_str(name);
                    out.push_str("> ");
                    render(&cell.content, symbols, out);
                    out.push_str(" </");
                    out.push_str(name);
                    out.push('>');
                }
                if let Some(rest) = &cells.rest {
                    if !cells.cells.is_empty() {
                        out.push(' ');
                    }
                    var(rest, symbols, out);
                }
            }
        }
    }

    let mut out = String::new();
    render(term, symbols, &mut out);
    out
}

#[cfg(test)]
#[path = "tests/term.rs"]
mod tests;
