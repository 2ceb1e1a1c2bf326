use crate::definition::{Definition, DefinitionBuilder, Rule};
use crate::machine::RewriteMachine;
use crate::symbol::{Label, SymbolStore};
use crate::term::{Term, Variable};
use std::sync::Arc;

pub(crate) fn setup() -> Arc<SymbolStore> {
    Arc::new(SymbolStore::new())
}

pub(crate) fn var(symbols: &SymbolStore, name: &str, sort: &str) -> Term {
    Term::var(Variable::new(symbols.intern(name), symbols.intern(sort)))
}

pub(crate) fn int_var(symbols: &SymbolStore, name: &str) -> Term {
    var(symbols, name, "Int")
}

pub(crate) fn rest_var(symbols: &SymbolStore, name: &str, sort: &str) -> Variable {
    Variable::rest(symbols.intern(name), symbols.intern(sort))
}

pub(crate) fn constant(symbols: &SymbolStore, name: &str) -> Term {
    Term::app0(symbols.intern(name))
}

pub(crate) fn app(symbols: &SymbolStore, label: &str, args: Vec<Term>) -> Term {
    Term::app(symbols.intern(label), args)
}

pub(crate) fn label(symbols: &SymbolStore, name: &str) -> Label {
    symbols.intern(name)
}

/// Builtins plus:
/// - `_+_(X:Int, Y:Int) => _+Int_(X, Y)`
/// - `freshId(N:Int) => id(N)` registered as the `Id` generator
pub(crate) fn arith_builder() -> DefinitionBuilder {
    let symbols = setup();
    let mut b = DefinitionBuilder::new(Arc::clone(&symbols)).with_builtins();
    b.subsort("Int", "Exp");
    let plus = b.constructor("_+_", 2, "Exp");
    b.constructor("id", 1, "Id");
    let fresh_id = b.function("freshId", 1, "Id");
    b.fresh_generator("Id", fresh_id);

    let x = int_var(&symbols, "X");
    let y = int_var(&symbols, "Y");
    let plus_int = symbols.intern("_+Int_");
    b.rule(
        Rule::new(
            Term::app(plus, vec![x.clone(), y.clone()]),
            Term::app(plus_int, vec![x, y]),
        )
        .named("plus"),
    );

    let n = int_var(&symbols, "N");
    b.rule(Rule::new(
        Term::app(fresh_id, vec![n.clone()]),
        app(&symbols, "id", vec![n]),
    ));
    b
}

pub(crate) fn arith_definition() -> Arc<Definition> {
    Arc::new(arith_builder().build().expect("arith definition builds"))
}

pub(crate) fn arith_machine() -> RewriteMachine {
    RewriteMachine::new(arith_definition())
}
