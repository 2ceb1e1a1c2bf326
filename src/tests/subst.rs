use super::*;
use crate::term::{Cell, CellIds, Variable};
use crate::test_utils::{constant, int_var, rest_var, setup};

fn x_var(s: &crate::symbol::SymbolStore) -> Variable {
    *int_var(s, "X").as_var().unwrap()
}

// ========== BINDINGS ==========

#[test]
fn new_subst_is_empty() {
    let subst = ExtendedSubstitution::new();
    assert!(subst.is_empty());
    assert_eq!(subst.len(), 0);
    assert!(subst.write_set().is_empty());
}

#[test]
fn bind_and_get() {
    let s = setup();
    let x = x_var(&s);
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 1)).unwrap();
    assert_eq!(subst.get(&x), Some(&Term::int(&s, 1)));
    assert!(subst.is_bound(&x));
}

#[test]
fn rebinding_equal_term_is_idempotent() {
    let s = setup();
    let x = x_var(&s);
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 1)).unwrap();
    subst.bind(x, Term::int(&s, 1)).unwrap();
    assert_eq!(subst.len(), 1);
}

#[test]
fn rebinding_different_term_conflicts() {
    let s = setup();
    let x = x_var(&s);
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 1)).unwrap();
    let err = subst.bind(x, Term::int(&s, 2)).unwrap_err();
    assert_eq!(err.var, x);
    assert_eq!(err.existing, Term::int(&s, 1));
    assert_eq!(err.incoming, Term::int(&s, 2));
    assert_eq!(subst.get(&x), Some(&Term::int(&s, 1)));
}

#[test]
fn bind_if_unbound_keeps_existing_binding() {
    let s = setup();
    let x = x_var(&s);
    let mut subst = ExtendedSubstitution::new();
    subst.bind_if_unbound(x, Term::int(&s, 1));
    subst.bind_if_unbound(x, Term::int(&s, 2));
    assert_eq!(subst.len(), 1);
    assert_eq!(subst.get(&x), Some(&Term::int(&s, 1)));
}

#[test]
fn merge_detects_conflicts() {
    let s = setup();
    let x = x_var(&s);
    let mut a = ExtendedSubstitution::new();
    a.bind(x, Term::int(&s, 1)).unwrap();
    let mut b = ExtendedSubstitution::new();
    b.bind(x, Term::int(&s, 2)).unwrap();
    assert!(a.merge(&b).is_err());

    let mut c = ExtendedSubstitution::new();
    c.bind(x, Term::int(&s, 1)).unwrap();
    assert!(a.merge(&c).is_ok());
}

#[test]
fn domain_within_declared_vars() {
    let s = setup();
    let x = x_var(&s);
    let y = *int_var(&s, "Y").as_var().unwrap();
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 1)).unwrap();
    assert!(subst.domain_within(&[x, y]));
    assert!(!subst.domain_within(&[y]));
}

// ========== WRITE SET ==========

#[test]
fn record_cell_is_idempotent() {
    let ids = CellIds::new();
    let (p, t) = (ids.next(), ids.next());
    let mut subst = ExtendedSubstitution::new();
    subst.record_cell(p, t);
    subst.record_cell(p, t);
    assert_eq!(subst.write_set().len(), 1);
    assert_eq!(subst.target_of(p), Some(t));
    assert!(subst.is_target(t));
    assert!(!subst.is_target(p));
}

#[test]
fn write_set_within_subject() {
    let s = setup();
    let ids = CellIds::new();
    let cell = Cell::new(&ids, s.intern("k"), Term::int(&s, 1));
    let subject = Term::cells([cell.clone()], None);

    let mut subst = ExtendedSubstitution::new();
    subst.record_cell(ids.next(), cell.id);
    assert!(subst.write_set_within(&subject));

    subst.record_cell(ids.next(), ids.next());
    assert!(!subst.write_set_within(&subject));
}

// ========== APPLICATION ==========

#[test]
fn apply_replaces_bound_variables() {
    let s = setup();
    let x = x_var(&s);
    let f = s.intern("f");
    let t = Term::app(f, vec![Term::var(x), int_var(&s, "Y")]);

    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 5)).unwrap();

    let out = apply_subst(&t, &subst);
    assert_eq!(out, Term::app(f, vec![Term::int(&s, 5), int_var(&s, "Y")]));
}

#[test]
fn apply_unused_binding_is_noop() {
    let s = setup();
    let t = Term::app(s.intern("f"), vec![constant(&s, "a")]);
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x_var(&s), Term::int(&s, 5)).unwrap();

    let out = apply_subst(&t, &subst);
    match (&out, &t) {
        (Term::App(a), Term::App(b)) => assert!(Arc::ptr_eq(a, b)),
        _ => panic!("expected application"),
    }
}

#[test]
fn apply_shares_untouched_subterms() {
    let s = setup();
    let x = x_var(&s);
    let big = Term::app(s.intern("g"), vec![constant(&s, "a"), constant(&s, "b")]);
    let t = Term::app(s.intern("f"), vec![Term::var(x), big.clone()]);

    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, Term::int(&s, 5)).unwrap();
    let out = apply_subst(&t, &subst);

    let shared = &out.as_app().unwrap().args[1];
    match (shared, &big) {
        (Term::App(a), Term::App(b)) => assert!(Arc::ptr_eq(a, b)),
        _ => panic!("expected application"),
    }
}

#[test]
fn apply_splices_list_rest_binding() {
    let s = setup();
    let op = s.known().kseq;
    let rest = rest_var(&s, "R", "K");
    let t = Term::list(op, [constant(&s, "a"), Term::var(rest)]);

    let mut subst = ExtendedSubstitution::new();
    subst
        .bind(rest, Term::list(op, [constant(&s, "b"), constant(&s, "c")]))
        .unwrap();

    let out = apply_subst(&t, &subst);
    assert_eq!(
        out,
        Term::list(op, [constant(&s, "a"), constant(&s, "b"), constant(&s, "c")])
    );
    assert_eq!(out.as_list().unwrap().items.len(), 3);
}

#[test]
fn apply_splices_cell_frame() {
    let s = setup();
    let ids = CellIds::new();
    let frame = rest_var(&s, "C", "Bag");
    let k = Cell::new(&ids, s.intern("k"), Term::int(&s, 1));
    let env = Cell::new(&ids, s.intern("env"), constant(&s, "e"));
    let t = Term::cells([k.clone()], Some(frame));

    let mut subst = ExtendedSubstitution::new();
    subst.bind(frame, Term::cells([env.clone()], None)).unwrap();

    let out = apply_subst(&t, &subst);
    let cells = out.as_cells().unwrap();
    assert_eq!(cells.cells.len(), 2);
    assert!(cells.rest.is_none());
    assert!(Arc::ptr_eq(&cells.cells[1], &env));
}

#[test]
fn substitution_is_idempotent() {
    let s = setup();
    let x = x_var(&s);
    let t = Term::app(s.intern("f"), vec![Term::var(x), Term::var(x)]);
    let mut subst = ExtendedSubstitution::new();
    subst.bind(x, constant(&s, "a")).unwrap();

    let once = apply_subst(&t, &subst);
    let twice = apply_subst(&once, &subst);
    assert_eq!(once, twice);
}
