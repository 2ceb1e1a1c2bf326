use lasso::{Spur, ThreadedRodeo};

/// Interned name of an application label (constructor or function).
pub type Label = Spur;

/// Interned name of a sort.
pub type Sort = Spur;

/// Interned name of a variable.
pub type VarName = Spur;

/// Symbols every definition relies on, interned once when the store is created.
#[derive(Debug, Clone, Copy)]
pub struct KnownSymbols {
    pub int: Sort,
    pub bool_: Sort,
    pub string: Sort,
    /// Sort of the top-level configuration and of `~>` sequences.
    pub k: Sort,
    /// Structural equality predicate, `_==K_`.
    pub eq_k: Label,
    pub not_bool: Label,
    pub and_bool: Label,
    /// Associative operator of computation sequences.
    pub kseq: Label,
}

/// Thread-safe symbol store for labels, sorts and variable names.
///
/// Guarantees:
/// - Same string always produces same key
/// - Labels and sorts share one namespace, so `Int` the sort and `Int` a label
///   resolve to the same key (the term model never confuses them because they
///   occupy different fields)
/// - The store is append-only and can be shared across worker threads
pub struct SymbolStore {
    rodeo: ThreadedRodeo,
    known: KnownSymbols,
}

impl SymbolStore {
    pub fn new() -> Self {
        let rodeo = ThreadedRodeo::new();
        let known = KnownSymbols {
            int: rodeo.get_or_intern_static("Int"),
            bool_: rodeo.get_or_intern_static("Bool"),
            string: rodeo.get_or_intern_static("String"),
            k: rodeo.get_or_intern_static("K"),
            eq_k: rodeo.get_or_intern_static("_==K_"),
            not_bool: rodeo.get_or_intern_static("notBool_"),
            and_bool: rodeo.get_or_intern_static("_andBool_"),
            kseq: rodeo.get_or_intern_static("_~>_"),
        };
        Self { rodeo, known }
    }

    pub fn intern(&self, name: &str) -> Spur {
        self.rodeo.get_or_intern(name)
    }

    /// Returns None if the key was not created by this store.
    pub fn resolve(&self, id: Spur) -> Option<&str> {
        self.rodeo.try_resolve(&id)
    }

    /// Resolve for display purposes; unknown keys render as `?`.
    pub fn name(&self, id: Spur) -> &str {
        self.resolve(id).unwrap_or("?")
    }

    pub fn get(&self, name: &str) -> Option<Spur> {
        self.rodeo.get(name)
    }

    pub fn known(&self) -> &KnownSymbols {
        &self.known
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolStore")
            .field("len", &self.rodeo.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let symbols = SymbolStore::new();
        let a = symbols.intern("_+_");
        let b = symbols.intern("_+_");
        assert_eq!(a, b);
        assert_eq!(symbols.resolve(a), Some("_+_"));
    }

    #[test]
    fn known_symbols_are_preinterned() {
        let symbols = SymbolStore::new();
        assert_eq!(symbols.get("Int"), Some(symbols.known().int));
        assert_eq!(symbols.get("_==K_"), Some(symbols.known().eq_k));
    }

    #[test]
    fn get_does_not_intern() {
        let symbols = SymbolStore::new();
        assert_eq!(symbols.get("never-seen"), None);
        assert!(symbols.resolve(symbols.intern("seen")).is_some());
    }
}
