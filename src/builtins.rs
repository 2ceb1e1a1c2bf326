//! Built-in function hooks.
//!
//! A hook receives already-evaluated arguments and returns `None` when it cannot
//! compute a result (symbolic argument, wrong sort, overflow). The caller then
//! keeps the application as an irreducible term.

use crate::symbol::SymbolStore;
use crate::term::Term;

pub type BuiltinFn = fn(&[Term], &SymbolStore) -> Option<Term>;

/// (label, arity, result sort, hook) for every hook `DefinitionBuilder::with_builtins`
/// installs.
pub const STANDARD_HOOKS: &[(&str, usize, &str, BuiltinFn)] = &[
    ("_+Int_", 2, "Int", add_int),
    ("_-Int_", 2, "Int", sub_int),
    ("_*Int_", 2, "Int", mul_int),
    ("_/Int_", 2, "Int", div_int),
    ("_%Int_", 2, "Int", mod_int),
    ("_<Int_", 2, "Bool", lt_int),
    ("_<=Int_", 2, "Bool", le_int),
    ("_>Int_", 2, "Bool", gt_int),
    ("_>=Int_", 2, "Bool", ge_int),
    ("_==Int_", 2, "Bool", eq_int),
    ("_==K_", 2, "Bool", eq_k),
    ("_=/=K_", 2, "Bool", ne_k),
    ("notBool_", 1, "Bool", not_bool),
    ("_andBool_", 2, "Bool", and_bool),
    ("_orBool_", 2, "Bool", or_bool),
    ("_+String_", 2, "String", concat_string),
    ("Int2String", 1, "String", int_to_string),
];

fn ints(args: &[Term], symbols: &SymbolStore) -> Option<(i64, i64)> {
    match args {
        [a, b] => Some((a.as_int(symbols)?, b.as_int(symbols)?)),
        _ => None,
    }
}

fn bools(args: &[Term]) -> Option<(bool, bool)> {
    match args {
        [a, b] => Some((a.as_bool()?, b.as_bool()?)),
        _ => None,
    }
}

pub fn add_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::int(symbols, a.checked_add(b)?))
}

pub fn sub_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::int(symbols, a.checked_sub(b)?))
}

pub fn mul_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::int(symbols, a.checked_mul(b)?))
}

/// Truncating division; division by zero is left unevaluated.
pub fn div_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::int(symbols, a.checked_div(b)?))
}

pub fn mod_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::int(symbols, a.checked_rem(b)?))
}

pub fn lt_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::bool(symbols, a < b))
}

pub fn le_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::bool(symbols, a <= b))
}

pub fn gt_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::bool(symbols, a > b))
}

pub fn ge_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::bool(symbols, a >= b))
}

pub fn eq_int(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let (a, b) = ints(args, symbols)?;
    Some(Term::bool(symbols, a == b))
}

/// Structural equality. Only decided when both sides are ground; two distinct
/// symbolic terms may still be equal under some assignment.
pub fn eq_k(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    match args {
        [a, b] if a == b => Some(Term::bool(symbols, true)),
        [a, b] if a.is_ground() && b.is_ground() => Some(Term::bool(symbols, false)),
        _ => None,
    }
}

pub fn ne_k(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let eq = eq_k(args, symbols)?.as_bool()?;
    Some(Term::bool(symbols, !eq))
}

pub fn not_bool(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    match args {
        [a] => Some(Term::bool(symbols, !a.as_bool()?)),
        _ => None,
    }
}

/// Short-circuits on a concrete `false` even when the other side is symbolic.
pub fn and_bool(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    match args {
        [a, b] if a.as_bool() == Some(false) || b.as_bool() == Some(false) => {
            Some(Term::bool(symbols, false))
        }
        [a, b] if a.as_bool() == Some(true) => Some(b.clone()),
        [a, b] if b.as_bool() == Some(true) => Some(a.clone()),
        _ => bools(args).map(|(a, b)| Term::bool(symbols, a && b)),
    }
}

pub fn or_bool(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    match args {
        [a, b] if a.as_bool() == Some(true) || b.as_bool() == Some(true) => {
            Some(Term::bool(symbols, true))
        }
        [a, b] if a.as_bool() == Some(false) => Some(b.clone()),
        [a, b] if b.as_bool() == Some(false) => Some(a.clone()),
        _ => bools(args).map(|(a, b)| Term::bool(symbols, a || b)),
    }
}

pub fn concat_string(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    let string = symbols.known().string;
    match args {
        [a, b] => {
            let (a, b) = (a.as_token()?, b.as_token()?);
            if a.sort != string || b.sort != string {
                return None;
            }
            Some(Term::token(string, format!("{}{}", a.value, b.value)))
        }
        _ => None,
    }
}

pub fn int_to_string(args: &[Term], symbols: &SymbolStore) -> Option<Term> {
    match args {
        [a] => Some(Term::string(symbols, &a.as_int(symbols)?.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        let s = SymbolStore::new();
        let (two, three) = (Term::int(&s, 2), Term::int(&s, 3));
        assert_eq!(add_int(&[two.clone(), three.clone()], &s), Some(Term::int(&s, 5)));
        assert_eq!(sub_int(&[two.clone(), three.clone()], &s), Some(Term::int(&s, -1)));
        assert_eq!(mul_int(&[two.clone(), three.clone()], &s), Some(Term::int(&s, 6)));
        assert_eq!(le_int(&[two, three], &s), Some(Term::bool(&s, true)));
    }

    #[test]
    fn division_by_zero_is_unevaluated() {
        let s = SymbolStore::new();
        assert_eq!(div_int(&[Term::int(&s, 1), Term::int(&s, 0)], &s), None);
    }

    #[test]
    fn overflow_is_unevaluated() {
        let s = SymbolStore::new();
        assert_eq!(add_int(&[Term::int(&s, i64::MAX), Term::int(&s, 1)], &s), None);
    }

    #[test]
    fn symbolic_argument_is_unevaluated() {
        let s = SymbolStore::new();
        let x = Term::var(crate::term::Variable::new(s.intern("X"), s.known().int));
        assert_eq!(add_int(&[x.clone(), Term::int(&s, 1)], &s), None);
        assert_eq!(eq_k(&[x.clone(), Term::int(&s, 1)], &s), None);
        assert_eq!(eq_k(&[x.clone(), x.clone()], &s), Some(Term::bool(&s, true)));
    }

    #[test]
    fn and_bool_short_circuits_on_symbolic() {
        let s = SymbolStore::new();
        let b = Term::var(crate::term::Variable::new(s.intern("B"), s.known().bool_));
        assert_eq!(and_bool(&[Term::bool(&s, false), b.clone()], &s), Some(Term::bool(&s, false)));
        assert_eq!(and_bool(&[Term::bool(&s, true), b.clone()], &s), Some(b));
    }

    #[test]
    fn strings() {
        let s = SymbolStore::new();
        let out = concat_string(&[Term::string(&s, "x"), Term::string(&s, "1")], &s);
        assert_eq!(out, Some(Term::string(&s, "x1")));
        assert_eq!(int_to_string(&[Term::int(&s, 42)], &s), Some(Term::string(&s, "42")));
    }

    #[test]
    fn numeric_strings_are_not_integers() {
        let s = SymbolStore::new();
        let (one, two) = (Term::string(&s, "1"), Term::string(&s, "2"));
        assert_eq!(add_int(&[one.clone(), two], &s), None);
        assert_eq!(add_int(&[one, Term::int(&s, 2)], &s), None);
        assert_eq!(int_to_string(&[Term::string(&s, "7")], &s), None);
    }
}
