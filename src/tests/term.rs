use super::*;
use crate::test_utils::{constant, int_var, rest_var, setup};

// ========== CONSTRUCTION ==========

#[test]
fn tokens_compare_by_sort_and_value() {
    let s = setup();
    assert_eq!(Term::int(&s, 1), Term::int(&s, 1));
    assert_ne!(Term::int(&s, 1), Term::int(&s, 2));
    assert_ne!(Term::int(&s, 1), Term::string(&s, "1"));
}

#[test]
fn int_and_bool_accessors() {
    let s = setup();
    assert_eq!(Term::int(&s, -7).as_int(&s), Some(-7));
    assert_eq!(Term::bool(&s, true).as_bool(), Some(true));
    assert_eq!(constant(&s, "a").as_int(&s), None);
    assert_eq!(Term::string(&s, "12").as_int(&s), None);
}

#[test]
fn applications_compare_structurally() {
    let s = setup();
    let f = s.intern("f");
    let a = Term::app(f, vec![Term::int(&s, 1), constant(&s, "x")]);
    let b = Term::app(f, vec![Term::int(&s, 1), constant(&s, "x")]);
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.top_label(), Some(f));
}

// ========== ASSOCIATIVITY ==========

#[test]
fn nested_lists_flatten() {
    let s = setup();
    let op = s.known().kseq;
    let (a, b, c) = (constant(&s, "a"), constant(&s, "b"), constant(&s, "c"));

    let left = Term::concat(op, Term::concat(op, a.clone(), b.clone()), c.clone());
    let right = Term::concat(op, a.clone(), Term::concat(op, b.clone(), c.clone()));

    assert_eq!(left, right);
    assert_eq!(left.fingerprint(), right.fingerprint());
    assert_eq!(left.as_list().unwrap().items.len(), 3);
}

#[test]
fn different_operators_do_not_flatten() {
    let s = setup();
    let seq = s.known().kseq;
    let comma = s.intern("_,_");
    let inner = Term::concat(comma, constant(&s, "a"), constant(&s, "b"));
    let outer = Term::concat(seq, inner, constant(&s, "c"));
    assert_eq!(outer.as_list().unwrap().items.len(), 2);
}

#[test]
fn empty_list_is_unit_of_concatenation() {
    let s = setup();
    let op = s.known().kseq;
    let a = constant(&s, "a");
    let with_unit = Term::concat(op, Term::list(op, []), Term::list(op, [a.clone()]));
    assert_eq!(with_unit, Term::list(op, [a]));
}

// ========== CELLS ==========

#[test]
fn cell_collections_are_multisets() {
    let s = setup();
    let ids = CellIds::new();
    let k = s.intern("k");
    let env = s.intern("env");
    let one = Term::int(&s, 1);

    let a = Term::cells(
        [Cell::new(&ids, k, one.clone()), Cell::new(&ids, env, constant(&s, "e"))],
        None,
    );
    let b = Term::cells(
        [Cell::new(&ids, env, constant(&s, "e")), Cell::new(&ids, k, one)],
        None,
    );

    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn cell_multiplicity_matters() {
    let s = setup();
    let ids = CellIds::new();
    let t = s.intern("thread");
    let x = constant(&s, "x");

    let one = Term::cells([Cell::new(&ids, t, x.clone())], None);
    let two = Term::cells([Cell::new(&ids, t, x.clone()), Cell::new(&ids, t, x)], None);
    assert_ne!(one, two);
}

#[test]
fn with_content_keeps_identity() {
    let s = setup();
    let ids = CellIds::new();
    let cell = Cell::new(&ids, s.intern("k"), Term::int(&s, 1));
    let updated = cell.with_content(Term::int(&s, 2));
    assert_eq!(cell.id, updated.id);
    assert_ne!(*cell, *updated);
}

#[test]
fn cell_ids_are_unique() {
    let ids = CellIds::new();
    let a = ids.next();
    let b = ids.next();
    assert_ne!(a, b);
    assert!(a < b);
}

#[test]
fn find_cell_reaches_nested_collections() {
    let s = setup();
    let ids = CellIds::new();
    let inner = Cell::new(&ids, s.intern("k"), Term::int(&s, 1));
    let inner_id = inner.id;
    let outer = Cell::new(&ids, s.intern("T"), Term::cells([inner], None));
    let config = Term::cells([outer.clone()], None);

    assert!(config.contains_cell(inner_id));
    assert!(config.contains_cell(outer.id));
    assert_eq!(config.cell_ids(), vec![outer.id, inner_id]);
}

// ========== TRAVERSAL ==========

#[test]
fn vars_in_first_occurrence_order() {
    let s = setup();
    let x = int_var(&s, "X");
    let y = int_var(&s, "Y");
    let t = Term::app(s.intern("f"), vec![x.clone(), y.clone(), x.clone()]);
    let vars = t.vars();
    assert_eq!(vars.len(), 2);
    assert_eq!(Term::var(vars[0]), x);
    assert_eq!(Term::var(vars[1]), y);
}

#[test]
fn rest_variable_of_cells_is_a_var() {
    let s = setup();
    let rest = rest_var(&s, "C", "Bag");
    let t = Term::cells(Vec::new(), Some(rest));
    assert_eq!(t.vars(), vec![rest]);
    assert!(!t.is_ground());
}

#[test]
fn ground_terms() {
    let s = setup();
    assert!(Term::app(s.intern("f"), vec![Term::int(&s, 1)]).is_ground());
    assert!(!Term::app(s.intern("f"), vec![int_var(&s, "X")]).is_ground());
}

#[test]
fn size_counts_every_node() {
    let s = setup();
    let t = Term::app(s.intern("f"), vec![Term::int(&s, 1), constant(&s, "a")]);
    assert_eq!(t.size(), 3);
}

// ========== FORMATTING ==========

#[test]
fn format_application_and_sequence() {
    let s = setup();
    let op = s.known().kseq;
    let t = Term::list(
        op,
        [
            Term::app(s.intern("f"), vec![Term::int(&s, 1), Term::string(&s, "x")]),
            constant(&s, "done"),
        ],
    );
    assert_eq!(format_term(&t, &s), "f(1, \"x\") ~> done");
}

#[test]
fn format_variables_and_cells() {
    let s = setup();
    let ids = CellIds::new();
    let cell = Cell::new(&ids, s.intern("k"), int_var(&s, "X"));
    let t = Term::cells([cell], Some(rest_var(&s, "R", "Bag")));
    assert_eq!(t.display(&s).to_string(), "<k> X:Int </k> R:Bag...");
}

#[test]
fn format_empty_list() {
    let s = setup();
    assert_eq!(format_term(&Term::list(s.known().kseq, []), &s), "._~>_");
}
